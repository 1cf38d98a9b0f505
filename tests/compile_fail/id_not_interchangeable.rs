// ABOUTME: Compile-fail test verifying DeploymentId and BuildRequestId are not interchangeable.
// ABOUTME: This test should fail to compile, validating type safety.

use convoy::types::{BuildRequestId, DeploymentId};

fn takes_deployment_id(_id: DeploymentId) {}

fn main() {
    let build = BuildRequestId::new("build-42");
    takes_deployment_id(build); // ERROR: expected DeploymentId, found BuildRequestId
}

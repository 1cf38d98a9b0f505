// ABOUTME: Compile-fail test verifying rollback cannot be called on a Healthy deployment.
// ABOUTME: This test should fail to compile, validating state machine safety.

use convoy::deploy::{DeployContext, Deployment, Healthy};

async fn try_invalid_rollback(deployment: Deployment<Healthy>, ctx: &DeployContext) {
    // ERROR: rollback() method doesn't exist on Deployment<Healthy>
    let _ = deployment.rollback(ctx).await;
}

fn main() {}

// ABOUTME: Compile-fail test verifying provision cannot be called before admission.
// ABOUTME: This test should fail to compile, so the approval gate cannot be skipped.

use convoy::deploy::{DeployContext, Deployment, Requested};

async fn try_skip_approval(deployment: Deployment<Requested>, ctx: &DeployContext) {
    // ERROR: provision() method doesn't exist on Deployment<Requested>
    let _ = deployment.provision(ctx).await;
}

fn main() {}

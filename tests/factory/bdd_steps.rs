//! BDD step definitions for remote host device creation.

use camino::Utf8PathBuf;
use cuttlehost::ImageSource;
use cuttlehost::test_support::UploadCall;
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{FactoryContext, FactoryOutcome, FactoryTestError, INSTANCE_NAME};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] FactoryTestError),
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a device factory for a remote host")]
fn device_factory(factory_context: FactoryContext) -> FactoryContext {
    factory_context
}

#[given("the images come from the local directory \"{dir}\"")]
fn images_from_local_dir(factory_context: FactoryContext, dir: String) -> FactoryContext {
    factory_context.local_dir(&dir)
}

#[given("the images come from the local archive \"{archive}\"")]
fn images_from_local_archive(mut factory_context: FactoryContext, archive: String) -> FactoryContext {
    factory_context.spec.image_source = ImageSource::Local;
    factory_context.artifacts.local_image = Some(Utf8PathBuf::from(archive));
    factory_context
}

#[given("the images come from a remote build")]
fn images_from_remote_build(factory_context: FactoryContext) -> FactoryContext {
    factory_context
}

#[given("the host accepts SSH connections")]
fn host_accepts_ssh(factory_context: FactoryContext) -> FactoryContext {
    factory_context.runner.push_success();
    factory_context
}

#[given("the SSH reachability check exits with code \"{code}\"")]
fn ssh_reachability_check_fails(factory_context: FactoryContext, code: i32) -> FactoryContext {
    factory_context
        .runner
        .push_output(Some(code), "", "Connection refused");
    factory_context
}

#[given("the fetch and the streamed transfer succeed")]
fn fetch_and_stream_succeed(factory_context: FactoryContext) -> FactoryContext {
    factory_context.runner.push_success();
    factory_context.runner.push_success();
    factory_context
}

#[given("the fetch succeeds but every streamed transfer exits with code \"{code}\"")]
fn streamed_transfer_fails(factory_context: FactoryContext, code: i32) -> FactoryContext {
    factory_context.runner.push_success();
    for _ in 0..factory_context.spec.config.shell_retry_attempts {
        factory_context.runner.push_failure(code);
    }
    factory_context
}

#[given("the device fails to boot with reason \"{reason}\"")]
fn device_fails_to_boot(mut factory_context: FactoryContext, reason: String) -> FactoryContext {
    factory_context.client = factory_context
        .client
        .clone()
        .with_launch_failure(INSTANCE_NAME, reason);
    factory_context
}

#[when("I create the instance")]
fn create_instance(mut factory_context: FactoryContext) -> Result<FactoryContext, StepError> {
    let runtime = Runtime::new()?;
    let factory = factory_context.factory();
    let result = runtime.block_on(factory.create_instance());
    let outcome = match result {
        Ok(instance_name) => FactoryOutcome::Created {
            instance_name,
            state: factory.state(),
            failures: factory.failures(),
        },
        Err(err) => FactoryOutcome::Failed {
            kind: err.kind(),
            message: err.to_string(),
            state: factory.state(),
        },
    };
    factory_context.outcome = Some(outcome);
    Ok(factory_context)
}

#[then("the instance \"{name}\" is reported as launched")]
fn instance_launched(factory_context: &FactoryContext, name: String) -> Result<(), StepError> {
    match factory_context.outcome {
        Some(FactoryOutcome::Created {
            ref instance_name,
            state,
            ref failures,
        }) => {
            if *instance_name != name {
                return Err(StepError::Assertion(format!(
                    "expected instance {name}, got {instance_name}"
                )));
            }
            if state.to_string() != "launched" {
                return Err(StepError::Assertion(format!("unexpected state {state}")));
            }
            if !failures.is_empty() {
                return Err(StepError::Assertion(format!(
                    "unexpected boot failures: {failures:?}"
                )));
            }
            Ok(())
        }
        ref other => Err(StepError::Assertion(format!(
            "expected a created instance, got {other:?}"
        ))),
    }
}

#[then("the directory \"{dir}\" is uploaded")]
fn directory_uploaded(factory_context: &FactoryContext, dir: String) -> Result<(), StepError> {
    expect_uploads(
        factory_context,
        &[UploadCall::ImageDir(Utf8PathBuf::from(dir))],
    )
}

#[then("the archive \"{archive}\" is uploaded")]
fn archive_uploaded(factory_context: &FactoryContext, archive: String) -> Result<(), StepError> {
    expect_uploads(
        factory_context,
        &[UploadCall::ImageZip(Utf8PathBuf::from(archive))],
    )
}

#[then("the launch requests a \"{disk}\" GB data disk and a \"{boot}\" second boot timeout")]
fn launch_arguments(
    factory_context: &FactoryContext,
    disk: u32,
    boot: u64,
) -> Result<(), StepError> {
    let calls = factory_context.client.launch_calls();
    let [call] = calls.as_slice() else {
        return Err(StepError::Assertion(format!(
            "expected one launch call, got {calls:?}"
        )));
    };
    if call.extra_data_disk_size_gb != disk || call.boot_timeout.as_secs() != boot {
        return Err(StepError::Assertion(format!("unexpected launch call {call:?}")));
    }
    Ok(())
}

#[then("the fetched images are streamed to the host once")]
fn streamed_once(factory_context: &FactoryContext) -> Result<(), StepError> {
    let programs: Vec<String> = factory_context
        .runner
        .invocations()
        .into_iter()
        .map(|invocation| invocation.program)
        .collect();
    if programs != ["/mock/ssh", "fetch_cvd", "sh"] {
        return Err(StepError::Assertion(format!(
            "unexpected command sequence {programs:?}"
        )));
    }
    if factory_context.globber.calls() != 1 {
        return Err(StepError::Assertion(format!(
            "expected one discovery pass, got {}",
            factory_context.globber.calls()
        )));
    }
    expect_uploads(factory_context, &[])
}

#[then("the failure registry records \"{reason}\" for \"{name}\"")]
fn failure_recorded(
    factory_context: &FactoryContext,
    reason: String,
    name: String,
) -> Result<(), StepError> {
    let Some(FactoryOutcome::Created { ref failures, .. }) = factory_context.outcome else {
        return Err(StepError::Assertion(format!(
            "expected a launched instance, got {:?}",
            factory_context.outcome
        )));
    };
    if failures.get(&name) != Some(&reason) {
        return Err(StepError::Assertion(format!(
            "expected {name} to fail with {reason}, got {failures:?}"
        )));
    }
    Ok(())
}

#[then("creation fails with a \"{kind}\" error")]
fn creation_fails(factory_context: &FactoryContext, kind: String) -> Result<(), StepError> {
    match factory_context.outcome {
        Some(FactoryOutcome::Failed {
            kind: actual,
            ref message,
            state,
        }) => {
            if actual.to_string() != kind {
                return Err(StepError::Assertion(format!(
                    "expected {kind} error, got {actual}: {message}"
                )));
            }
            if state.to_string() != "failed" {
                return Err(StepError::Assertion(format!("unexpected state {state}")));
            }
            Ok(())
        }
        ref other => Err(StepError::Assertion(format!(
            "expected a failure, got {other:?}"
        ))),
    }
}

#[then("the host is never initialised")]
fn host_not_initialised(factory_context: &FactoryContext) -> Result<(), StepError> {
    if factory_context.client.init_calls() != 0 {
        return Err(StepError::Assertion(String::from(
            "host initialisation ran after a failed reachability check",
        )));
    }
    Ok(())
}

#[then("no launch is requested")]
fn no_launch(factory_context: &FactoryContext) -> Result<(), StepError> {
    let calls = factory_context.client.launch_calls();
    if !calls.is_empty() {
        return Err(StepError::Assertion(format!(
            "unexpected launch calls {calls:?}"
        )));
    }
    Ok(())
}

fn expect_uploads(
    factory_context: &FactoryContext,
    expected: &[UploadCall],
) -> Result<(), StepError> {
    let calls = factory_context.uploader.calls();
    if calls != expected {
        return Err(StepError::Assertion(format!(
            "expected uploads {expected:?}, got {calls:?}"
        )));
    }
    Ok(())
}

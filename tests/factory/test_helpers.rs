//! Shared fixtures for device factory BDD scenarios.

use std::time::Duration;

use camino::Utf8PathBuf;
use cuttlehost::device::{DeviceSpecError, RemoteBuild};
use cuttlehost::test_support::{
    RecordingUploader, ScriptedClient, ScriptedRunner, StaticCredentials, StaticGlobber,
};
use cuttlehost::{
    Credentials, DeviceFactory, DeviceSpec, ErrorKind, FactoryArtifacts, FactoryState,
    HostConfig, LaunchFailures,
};
use rstest::fixture;
use thiserror::Error;

pub const INSTANCE_NAME: &str = "inst";

#[derive(Clone, Debug)]
pub struct FactoryContext {
    pub runner: ScriptedRunner,
    pub client: ScriptedClient,
    pub uploader: RecordingUploader,
    pub globber: StaticGlobber,
    pub credentials: StaticCredentials,
    pub spec: DeviceSpec,
    pub artifacts: FactoryArtifacts,
    pub outcome: Option<FactoryOutcome>,
}

#[derive(Clone, Debug)]
pub enum FactoryOutcome {
    Created {
        instance_name: String,
        state: FactoryState,
        failures: LaunchFailures,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        state: FactoryState,
    },
}

#[derive(Clone, Debug, Error)]
pub enum FactoryTestError {
    #[error(transparent)]
    Spec(#[from] DeviceSpecError),
}

pub type FactoryContextResult = Result<FactoryContext, FactoryTestError>;

#[fixture]
pub fn factory_context_result() -> FactoryContextResult {
    build_factory_context()
}

#[fixture]
pub fn factory_context(factory_context_result: FactoryContextResult) -> FactoryContext {
    factory_context_result
        .unwrap_or_else(|err| panic!("factory context fixture should initialise: {err}"))
}

fn build_factory_context() -> FactoryContextResult {
    let spec = DeviceSpec::builder()
        .remote_host("192.0.2.100")
        .host_user("vsoc-01")
        .host_ssh_private_key_path(Some(String::from("/fake/acloud_rsa")))
        .remote_build(RemoteBuild {
            branch: Some(String::from("aosp-main")),
            build_id: None,
            build_target: String::from("aosp_cf_x86_64_phone-userdebug"),
        })
        .boot_timeout(Duration::from_secs(100))
        .ins_timeout(Duration::from_secs(200))
        .config(HostConfig {
            ssh_bin: String::from("/mock/ssh"),
            extra_data_disk_size_gb: 10,
            shell_retry_attempts: 3,
            shell_retry_delay_secs: 0,
            ..HostConfig::with_defaults()
        })
        .build()?;

    Ok(FactoryContext {
        runner: ScriptedRunner::new(),
        client: ScriptedClient::new(INSTANCE_NAME),
        uploader: RecordingUploader::new(),
        globber: StaticGlobber::new(["super.img", "vbmeta.img"]),
        credentials: StaticCredentials::new(Credentials::anonymous()),
        spec,
        artifacts: FactoryArtifacts::default(),
        outcome: None,
    })
}

impl FactoryContext {
    pub fn factory(
        &self,
    ) -> DeviceFactory<ScriptedRunner, ScriptedClient, RecordingUploader> {
        DeviceFactory::new(
            self.spec.clone(),
            self.artifacts.clone(),
            self.runner.clone(),
            self.client.clone(),
            self.uploader.clone(),
        )
        .with_credentials(Box::new(self.credentials.clone()))
        .with_globber(Box::new(self.globber.clone()))
    }

    pub fn local_dir(mut self, dir: &str) -> Self {
        self.spec.image_source = cuttlehost::ImageSource::Local;
        self.spec.local_image_dir = Some(Utf8PathBuf::from(dir));
        self
    }
}

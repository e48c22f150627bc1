//! Unit tests for the device factory.

use super::*;
use crate::config::HostConfig;
use crate::credentials::CredentialError;
use crate::cvd_utils::UploadError;
use crate::device::{DeviceSpecBuilder, ImageSource, RemoteBuild};
use crate::test_support::{
    LaunchCall, RecordingUploader, ScriptedClient, ScriptedRunner, StaticCredentials,
    StaticGlobber, UploadCall,
};
use rstest::{fixture, rstest};
use std::time::Duration;

type TestFactory = DeviceFactory<ScriptedRunner, ScriptedClient, RecordingUploader>;

struct Doubles {
    runner: ScriptedRunner,
    client: ScriptedClient,
    uploader: RecordingUploader,
    globber: StaticGlobber,
    credentials: StaticCredentials,
}

impl Doubles {
    fn factory(&self, spec: DeviceSpec, artifacts: FactoryArtifacts) -> TestFactory {
        DeviceFactory::new(
            spec,
            artifacts,
            self.runner.clone(),
            self.client.clone(),
            self.uploader.clone(),
        )
        .with_credentials(Box::new(self.credentials.clone()))
        .with_globber(Box::new(self.globber.clone()))
    }
}

#[fixture]
fn doubles() -> Doubles {
    Doubles {
        runner: ScriptedRunner::new(),
        client: ScriptedClient::new("inst"),
        uploader: RecordingUploader::new(),
        globber: StaticGlobber::new(["super.img"]),
        credentials: StaticCredentials::new(Credentials::anonymous()),
    }
}

#[fixture]
fn builder() -> DeviceSpecBuilder {
    DeviceSpec::builder()
        .remote_host("192.0.2.100")
        .host_user("vsoc-01")
        .host_ssh_private_key_path(Some(String::from("/fake/acloud_rsa")))
        .remote_build(RemoteBuild {
            branch: Some(String::from("aosp-android12-gsi")),
            build_id: Some(String::from("100000")),
            build_target: String::from("aosp_cf_x86_64_phone-userdebug"),
        })
        .ins_timeout(Duration::from_secs(200))
        .boot_timeout(Duration::from_secs(100))
        .gpu(Some(String::from("auto")))
        .config(HostConfig {
            ssh_bin: String::from("/mock/ssh"),
            extra_data_disk_size_gb: 10,
            shell_retry_delay_secs: 0,
            ..HostConfig::with_defaults()
        })
}

fn local_dir_spec(builder: DeviceSpecBuilder) -> DeviceSpec {
    builder
        .image_source(ImageSource::Local)
        .local_image_dir(Some(Utf8PathBuf::from("/mock/img")))
        .build()
        .expect("spec")
}

#[rstest]
#[tokio::test]
async fn local_directory_source_uploads_directory_and_launches(
    doubles: Doubles,
    builder: DeviceSpecBuilder,
) {
    doubles.runner.push_success();
    let factory = doubles.factory(local_dir_spec(builder), FactoryArtifacts::default());

    let name = factory.create_instance().await.expect("create");

    assert_eq!(name, "inst");
    assert_eq!(
        doubles.uploader.calls(),
        vec![UploadCall::ImageDir(Utf8PathBuf::from("/mock/img"))]
    );
    assert_eq!(doubles.client.init_calls(), 1);
    assert_eq!(
        doubles.client.launch_calls(),
        vec![LaunchCall {
            instance_name: String::from("inst"),
            extra_data_disk_size_gb: 10,
            boot_timeout: Duration::from_secs(100),
        }]
    );
    assert_eq!(doubles.runner.invocations().len(), 1, "only the SSH reachability check runs");
    assert_eq!(factory.state(), FactoryState::Launched);
    assert!(factory.failures().is_empty());
}

#[rstest]
#[tokio::test]
async fn local_archive_source_uploads_archive_only(doubles: Doubles, builder: DeviceSpecBuilder) {
    doubles.runner.push_success();
    let spec = builder.image_source(ImageSource::Local).build().expect("spec");
    let factory = doubles.factory(
        spec,
        FactoryArtifacts {
            local_image: Some(Utf8PathBuf::from("/mock/img.zip")),
            cvd_host_package: None,
        },
    );

    factory.create_instance().await.expect("create");

    assert_eq!(
        doubles.uploader.calls(),
        vec![UploadCall::ImageZip(Utf8PathBuf::from("/mock/img.zip"))]
    );
}

#[rstest]
#[tokio::test]
async fn remote_source_fetches_then_pipes_once(doubles: Doubles, builder: DeviceSpecBuilder) {
    doubles.runner.push_success();
    doubles.runner.push_success();
    doubles.runner.push_success();
    let factory = doubles.factory(
        builder.build().expect("spec"),
        FactoryArtifacts::default(),
    );

    factory.create_instance().await.expect("create");

    let invocations = doubles.runner.invocations();
    let programs: Vec<&str> = invocations.iter().map(|call| call.program.as_str()).collect();
    assert_eq!(programs, vec!["/mock/ssh", "fetch_cvd", "sh"]);

    let pipe = invocations[2]
        .args
        .last()
        .expect("pipeline argument")
        .to_string_lossy()
        .into_owned();
    let base_cmd = "/mock/ssh -i /fake/acloud_rsa -o BatchMode=yes -o StrictHostKeyChecking=no \
                    -o UserKnownHostsFile=/dev/null -l vsoc-01 192.0.2.100";
    let (prefix, rest) = pipe
        .split_once(" -C ")
        .expect("pipe names a source directory");
    assert_eq!(prefix, "tar -cf - --lzop -S");
    let (dir, tail) = rest.split_once(' ').expect("pipe names files");
    assert!(!dir.is_empty() && !dir.contains(char::is_whitespace));
    assert_eq!(
        tail,
        format!("super.img | {base_cmd} -- tar -xf - --lzop -S")
    );

    assert_eq!(doubles.globber.calls(), 1);
    assert!(doubles.uploader.calls().is_empty());
    assert_eq!(doubles.client.init_calls(), 1);
}

#[rstest]
#[case::local_dir(ImageSource::Local)]
#[case::remote(ImageSource::Remote)]
#[tokio::test]
async fn host_package_is_uploaded_for_every_source(
    doubles: Doubles,
    builder: DeviceSpecBuilder,
    #[case] source: ImageSource,
) {
    for _ in 0..3 {
        doubles.runner.push_success();
    }
    let spec = builder
        .image_source(source)
        .local_image_dir(Some(Utf8PathBuf::from("/mock/img")))
        .build()
        .expect("spec");
    let package = Utf8PathBuf::from("/mock/cvd-host_package.tar.gz");
    let factory = doubles.factory(
        spec,
        FactoryArtifacts {
            local_image: None,
            cvd_host_package: Some(package.clone()),
        },
    );

    factory.create_instance().await.expect("create");

    let packages: Vec<UploadCall> = doubles
        .uploader
        .calls()
        .into_iter()
        .filter(|call| matches!(call, UploadCall::HostPackage(_)))
        .collect();
    assert_eq!(packages, vec![UploadCall::HostPackage(package)]);
}

#[rstest]
#[tokio::test]
async fn boot_failures_are_recorded_and_name_returned(doubles: Doubles, builder: DeviceSpecBuilder) {
    doubles.runner.push_success();
    let client = doubles.client.clone().with_launch_failure("inst", "some errors");
    let factory = DeviceFactory::new(
        local_dir_spec(builder),
        FactoryArtifacts::default(),
        doubles.runner.clone(),
        client,
        doubles.uploader.clone(),
    )
    .with_credentials(Box::new(doubles.credentials.clone()));

    let name = factory.create_instance().await.expect("create");

    assert_eq!(name, "inst");
    assert_eq!(
        factory.failures().get("inst").map(String::as_str),
        Some("some errors")
    );
    assert_eq!(factory.state(), FactoryState::Launched);
}

#[rstest]
#[tokio::test]
async fn configuration_errors_precede_remote_actions(doubles: Doubles, builder: DeviceSpecBuilder) {
    let spec = builder.image_source(ImageSource::Local).build().expect("spec");
    let factory = doubles.factory(spec, FactoryArtifacts::default());

    let err = factory.create_instance().await.expect_err("no local image");

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(doubles.runner.invocations().is_empty());
    assert_eq!(doubles.client.init_calls(), 0);
    assert_eq!(factory.state(), FactoryState::Failed);
}

#[rstest]
#[tokio::test]
async fn credential_errors_precede_remote_actions(doubles: Doubles, builder: DeviceSpecBuilder) {
    let credentials = StaticCredentials::failing(CredentialError::MissingCacheFile {
        path: Utf8PathBuf::from("/missing/creds"),
    });
    let factory = doubles
        .factory(local_dir_spec(builder), FactoryArtifacts::default())
        .with_credentials(Box::new(credentials));

    let err = factory.create_instance().await.expect_err("credentials fail");

    assert!(matches!(err, FactoryError::Credentials(_)), "{err:?}");
    assert!(doubles.runner.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn connect_failure_stops_before_init(doubles: Doubles, builder: DeviceSpecBuilder) {
    doubles.runner.push_output(Some(255), "", "Connection refused");
    let factory = doubles.factory(local_dir_spec(builder), FactoryArtifacts::default());

    let err = factory.create_instance().await.expect_err("unreachable");

    assert!(
        matches!(err, FactoryError::Connectivity { ref host, .. } if host == "192.0.2.100"),
        "{err:?}"
    );
    assert_eq!(doubles.client.init_calls(), 0);
    assert!(doubles.uploader.calls().is_empty());
    assert!(doubles.client.launch_calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn init_failure_is_a_connectivity_error(doubles: Doubles, builder: DeviceSpecBuilder) {
    doubles.runner.push_success();
    let factory = DeviceFactory::new(
        local_dir_spec(builder),
        FactoryArtifacts::default(),
        doubles.runner.clone(),
        doubles.client.clone().failing_init(),
        doubles.uploader.clone(),
    )
    .with_credentials(Box::new(doubles.credentials.clone()));

    let err = factory.create_instance().await.expect_err("init fails");

    assert!(matches!(err, FactoryError::HostInit { .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert!(doubles.uploader.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn transfer_failure_prevents_launch(doubles: Doubles, builder: DeviceSpecBuilder) {
    doubles.runner.push_success();
    let uploader = doubles.uploader.clone().failing(UploadError::NoImages {
        dir: Utf8PathBuf::from("/mock/img"),
    });
    let factory = DeviceFactory::new(
        local_dir_spec(builder),
        FactoryArtifacts::default(),
        doubles.runner.clone(),
        doubles.client.clone(),
        uploader,
    )
    .with_credentials(Box::new(doubles.credentials.clone()));

    let err = factory.create_instance().await.expect_err("upload fails");

    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert!(doubles.client.launch_calls().is_empty());
    assert_eq!(factory.state(), FactoryState::Failed);
}

#[rstest]
#[tokio::test]
async fn launch_request_failure_is_raised(doubles: Doubles, builder: DeviceSpecBuilder) {
    doubles.runner.push_success();
    let factory = DeviceFactory::new(
        local_dir_spec(builder),
        FactoryArtifacts::default(),
        doubles.runner.clone(),
        doubles.client.clone().failing_launch(),
        doubles.uploader.clone(),
    )
    .with_credentials(Box::new(doubles.credentials.clone()));

    let err = factory.create_instance().await.expect_err("launch fails");

    assert!(
        matches!(err, FactoryError::LaunchRequest { ref instance_name, .. } if instance_name == "inst"),
        "{err:?}"
    );
    assert!(factory.failures().is_empty());
}

#[rstest]
#[tokio::test]
async fn launch_over_broken_ssh_is_a_launch_request_error(
    doubles: Doubles,
    builder: DeviceSpecBuilder,
) {
    doubles.runner.push_success();
    doubles.runner.push_success();
    doubles
        .runner
        .push_output(Some(255), "", "ssh: connect to host 192.0.2.100 port 22: Connection refused");
    let factory = DeviceFactory::new(
        local_dir_spec(builder),
        FactoryArtifacts::default(),
        doubles.runner.clone(),
        ssh_client as SshClientProvider,
        doubles.uploader.clone(),
    )
    .with_credentials(Box::new(doubles.credentials.clone()));

    let err = factory.create_instance().await.expect_err("launch never delivered");

    assert_eq!(err.kind(), ErrorKind::LaunchRequest);
    assert!(
        matches!(
            err,
            FactoryError::LaunchRequest {
                source: crate::client::ClientError::Transport { .. },
                ..
            }
        ),
        "{err:?}"
    );
    assert!(factory.failures().is_empty());
    assert_eq!(factory.state(), FactoryState::Failed);
}

#[rstest]
#[tokio::test]
async fn second_attempt_is_rejected(doubles: Doubles, builder: DeviceSpecBuilder) {
    doubles.runner.push_success();
    let factory = doubles.factory(local_dir_spec(builder), FactoryArtifacts::default());
    factory.create_instance().await.expect("first attempt");

    let err = factory.create_instance().await.expect_err("second attempt");

    assert!(
        matches!(err, FactoryError::AlreadyAttempted { state: FactoryState::Launched }),
        "{err:?}"
    );
    assert_eq!(doubles.client.init_calls(), 1);
}

#[rstest]
fn compute_client_builds_client_once(doubles: Doubles, builder: DeviceSpecBuilder) {
    let factory = doubles.factory(local_dir_spec(builder), FactoryArtifacts::default());

    let first: *const ScriptedClient = factory.compute_client().expect("client");
    let second: *const ScriptedClient = factory.compute_client().expect("client");

    assert_eq!(first, second);
    assert_eq!(doubles.client.created(), 1);
    assert_eq!(doubles.credentials.calls(), 1);
}

#[rstest]
fn factory_state_labels() {
    assert_eq!(FactoryState::Unprepared.to_string(), "unprepared");
    assert_eq!(FactoryState::HostInitialized.to_string(), "host-initialized");
    assert_eq!(FactoryState::Failed.to_string(), "failed");
}

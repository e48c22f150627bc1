//! BDD scenarios for remote host device creation.

use rstest_bdd_macros::scenario;

use super::test_helpers::{FactoryContext, factory_context};

#[scenario(
    path = "tests/features/factory.feature",
    name = "Launch from a local image directory"
)]
fn scenario_local_directory(factory_context: FactoryContext) {
    drop(factory_context);
}

#[scenario(
    path = "tests/features/factory.feature",
    name = "Launch from a local image archive"
)]
fn scenario_local_archive(factory_context: FactoryContext) {
    drop(factory_context);
}

#[scenario(
    path = "tests/features/factory.feature",
    name = "Fetch a remote build and stream it to the host"
)]
fn scenario_remote_fetch(factory_context: FactoryContext) {
    drop(factory_context);
}

#[scenario(
    path = "tests/features/factory.feature",
    name = "Record a device that fails to boot"
)]
fn scenario_boot_failure(factory_context: FactoryContext) {
    drop(factory_context);
}

#[scenario(
    path = "tests/features/factory.feature",
    name = "Surface an unreachable host"
)]
fn scenario_unreachable_host(factory_context: FactoryContext) {
    drop(factory_context);
}

#[scenario(
    path = "tests/features/factory.feature",
    name = "Surface a streamed transfer that keeps failing"
)]
fn scenario_transfer_failure(factory_context: FactoryContext) {
    drop(factory_context);
}

//! Scenario tests for the provision step against a scripted compute service.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::compute::{STATE_ACTIVE, STATE_BUILD, STATE_DELETED};
use crate::config::BuilderConfig;
use crate::pipeline::{BuildContext, Step, StepAction};
use crate::test_support::{ComputeCall, RecordingUi, ScriptedCompute};

use super::ProvisionStep;

fn config() -> BuilderConfig {
    BuilderConfig {
        compute_endpoint: String::from("https://compute.example.net/v2.1"),
        auth_token: String::from("token"),
        instance_name: String::from("builder"),
        flavor: String::from("f1"),
        source_image: String::from("img-1"),
        security_groups: Vec::new(),
        networks: Vec::new(),
        ports: Vec::new(),
        availability_zone: String::new(),
        availability_zones: Vec::new(),
        user_data: String::new(),
        user_data_file: None,
        config_drive: false,
        instance_metadata: BTreeMap::new(),
        use_block_storage_volume: false,
        volume_id: None,
        force_delete: false,
        ssh_keypair_name: String::new(),
    }
}

fn context(zones: &[&str]) -> BuildContext {
    BuildContext {
        flavor_id: String::from("f1"),
        image_id: String::from("img-1"),
        availability_zones: zones.iter().map(|zone| (*zone).to_owned()).collect(),
        ..BuildContext::default()
    }
}

fn step(compute: &ScriptedCompute, cfg: &BuilderConfig) -> ProvisionStep<ScriptedCompute> {
    ProvisionStep::new(compute.clone(), cfg)
        .with_poll_interval(Duration::from_millis(1))
        .with_max_state_wait(Duration::from_millis(250))
}

#[tokio::test]
async fn happy_path_publishes_handle_with_final_state() {
    let compute = ScriptedCompute::new();
    compute.push_create_ok("srv-1");
    compute.push_state(STATE_BUILD);
    compute.push_state(STATE_BUILD);
    compute.push_state(STATE_ACTIVE);

    let mut provision = step(&compute, &config());
    let mut ctx = context(&["az1", "az2"]);
    let mut ui = RecordingUi::new();

    let action = provision.run(&mut ctx, &mut ui).await;

    assert_eq!(action, StepAction::Continue);
    assert_eq!(compute.create_zones(), ["az1"]);
    let published = ctx.server.map(|server| (server.id, server.state));
    assert_eq!(
        published,
        Some((String::from("srv-1"), STATE_ACTIVE.to_owned()))
    );
}

#[tokio::test]
async fn preferred_zone_is_attempted_first_then_fallback() {
    let compute = ScriptedCompute::new();
    compute.push_create_err("no capacity in az2");
    compute.push_create_ok("srv-1");
    compute.push_state(STATE_ACTIVE);

    let mut cfg = config();
    cfg.availability_zone = String::from("az2");
    let mut provision = step(&compute, &cfg);
    let mut ctx = context(&["az1", "az2"]);
    let mut ui = RecordingUi::new();

    let action = provision.run(&mut ctx, &mut ui).await;

    assert_eq!(action, StepAction::Continue);
    assert_eq!(compute.create_zones(), ["az2", "az1"]);
}

#[tokio::test]
async fn stops_at_first_successful_zone() {
    let compute = ScriptedCompute::new();
    compute.push_create_err("maintenance in az1");
    compute.push_create_err("maintenance in az2");
    compute.push_create_ok("srv-1");
    compute.push_state(STATE_ACTIVE);

    let mut provision = step(&compute, &config());
    let mut ctx = context(&["az1", "az2", "az3", "az4"]);
    let mut ui = RecordingUi::new();

    let action = provision.run(&mut ctx, &mut ui).await;

    assert_eq!(action, StepAction::Continue);
    assert_eq!(compute.create_zones(), ["az1", "az2", "az3"]);
}

#[tokio::test]
async fn exhausted_zones_surface_the_last_error() {
    let compute = ScriptedCompute::new();
    compute.push_create_err("rejected in az1");
    compute.push_create_err("rejected in az2");

    let mut provision = step(&compute, &config());
    let mut ctx = context(&["az1", "az2"]);
    let mut ui = RecordingUi::new();

    let action = provision.run(&mut ctx, &mut ui).await;

    assert_eq!(action, StepAction::Halt);
    assert_eq!(compute.create_zones(), ["az1", "az2"]);
    let stored = ctx.error.map(|err| err.to_string()).unwrap_or_default();
    assert!(
        stored.contains("rejected in az2"),
        "last zone's error should surface: {stored}"
    );
    assert!(ctx.server.is_none());
}

#[tokio::test]
async fn readiness_failure_deletes_instance_before_next_zone() {
    let compute = ScriptedCompute::new();
    compute.push_create_ok("srv-1");
    compute.push_state("ERROR");
    compute.push_delete_ok();
    compute.push_create_ok("srv-2");
    compute.push_state(STATE_ACTIVE);

    let mut provision = step(&compute, &config());
    let mut ctx = context(&["az1", "az2"]);
    let mut ui = RecordingUi::new();

    let action = provision.run(&mut ctx, &mut ui).await;

    assert_eq!(action, StepAction::Continue);
    assert_eq!(compute.create_zones(), ["az1", "az2"]);
    assert!(
        compute.calls().contains(&ComputeCall::Delete {
            id: String::from("srv-1"),
            forced: false,
        }),
        "half-provisioned instance should be deleted: {:?}",
        compute.calls()
    );
    let published = ctx.server.map(|server| server.id);
    assert_eq!(published, Some(String::from("srv-2")));
}

#[tokio::test]
async fn volume_backed_boot_without_volume_id_halts_before_any_call() {
    let compute = ScriptedCompute::new();
    let mut cfg = config();
    cfg.use_block_storage_volume = true;

    let mut provision = step(&compute, &cfg);
    let mut ctx = context(&["az1"]);
    let mut ui = RecordingUi::new();

    let action = provision.run(&mut ctx, &mut ui).await;

    assert_eq!(action, StepAction::Halt);
    assert!(compute.calls().is_empty(), "no provider call expected");
    let stored = ctx.error.map(|err| err.to_string()).unwrap_or_default();
    assert!(stored.contains("volume"), "unexpected error: {stored}");
}

#[tokio::test]
async fn unreadable_user_data_file_halts_before_any_call() {
    let compute = ScriptedCompute::new();
    let mut cfg = config();
    cfg.user_data_file = Some(String::from("/definitely/not/here"));

    let mut provision = step(&compute, &cfg);
    let mut ctx = context(&["az1"]);
    let mut ui = RecordingUi::new();

    let action = provision.run(&mut ctx, &mut ui).await;

    assert_eq!(action, StepAction::Halt);
    assert!(compute.calls().is_empty(), "no provider call expected");
}

#[tokio::test]
async fn cleanup_without_handle_is_a_no_op() {
    let compute = ScriptedCompute::new();
    let mut provision = step(&compute, &config());
    let mut ctx = context(&[]);
    let mut ui = RecordingUi::new();

    provision.cleanup(&mut ctx, &mut ui).await;

    assert!(compute.calls().is_empty());
    assert!(ui.events().is_empty());
}

#[tokio::test]
async fn cleanup_deletes_and_waits_for_deletion() {
    let compute = ScriptedCompute::new();
    compute.push_create_ok("srv-1");
    compute.push_state(STATE_ACTIVE);
    compute.push_delete_ok();
    compute.push_state(STATE_ACTIVE);
    compute.push_state(STATE_DELETED);

    let mut provision = step(&compute, &config());
    let mut ctx = context(&["az1"]);
    let mut ui = RecordingUi::new();
    let action = provision.run(&mut ctx, &mut ui).await;
    assert_eq!(action, StepAction::Continue);

    provision.cleanup(&mut ctx, &mut ui).await;

    assert!(provision.server().is_none(), "handle should be released");
    assert!(ui.errors().is_empty(), "teardown should be clean");
}

#[tokio::test]
async fn failing_forced_delete_is_reported_without_a_deletion_wait() {
    let compute = ScriptedCompute::new();
    compute.push_create_ok("srv-1");
    compute.push_state(STATE_ACTIVE);
    compute.push_delete_err("api unavailable");

    let mut cfg = config();
    cfg.force_delete = true;
    let mut provision = step(&compute, &cfg);
    let mut ctx = context(&["az1"]);
    let mut ui = RecordingUi::new();
    let action = provision.run(&mut ctx, &mut ui).await;
    assert_eq!(action, StepAction::Continue);
    let calls_before = compute.calls().len();

    provision.cleanup(&mut ctx, &mut ui).await;

    let calls = compute.calls();
    assert_eq!(
        calls.get(calls_before),
        Some(&ComputeCall::Delete {
            id: String::from("srv-1"),
            forced: true,
        })
    );
    assert_eq!(
        calls.len(),
        calls_before + 1,
        "no deletion wait after a failed delete: {calls:?}"
    );
    let errors = ui.errors();
    assert!(
        errors
            .iter()
            .any(|text| text.contains("may still be around")),
        "delete failure should be reported: {errors:?}"
    );
}

#[tokio::test]
async fn cancellation_mid_wait_halts_and_tears_down() {
    let compute = ScriptedCompute::new();
    compute.push_create_ok("srv-1");
    compute.push_state(STATE_BUILD);
    compute.push_delete_ok();

    let mut provision = step(&compute, &config());
    let mut ctx = context(&["az1"]);
    ctx.cancel.cancel();
    let mut ui = RecordingUi::new();

    let action = provision.run(&mut ctx, &mut ui).await;

    assert_eq!(action, StepAction::Halt);
    let stored = ctx.error.map(|err| err.to_string()).unwrap_or_default();
    assert!(
        stored.contains("cancelled"),
        "cancellation should surface: {stored}"
    );
}

//! End-to-end pipeline tests driving the provision step through the public
//! API against a scripted compute service.

use std::collections::BTreeMap;
use std::time::Duration;

use imago::test_support::{ComputeCall, RecordingUi, ScriptedCompute};
use imago::{BuildContext, BuilderConfig, ProvisionStep, Step, StepAction, run_pipeline};

fn config() -> BuilderConfig {
    BuilderConfig {
        compute_endpoint: String::from("https://compute.example.net/v2.1"),
        auth_token: String::from("token"),
        instance_name: String::from("imago-e2e"),
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

fn steps(compute: &ScriptedCompute, cfg: &BuilderConfig) -> Vec<Box<dyn Step + Send>> {
    vec![Box::new(
        ProvisionStep::new(compute.clone(), cfg)
            .with_poll_interval(Duration::from_millis(1))
            .with_max_state_wait(Duration::from_millis(250)),
    )]
}

#[tokio::test]
async fn full_lifecycle_creates_waits_publishes_and_tears_down() {
    let compute = ScriptedCompute::new();
    compute.push_create_ok("srv-1");
    compute.push_state("BUILD");
    compute.push_state("BUILD");
    compute.push_state("ACTIVE");
    compute.push_delete_ok();
    compute.push_state("ACTIVE");
    compute.push_state("DELETED");

    let cfg = config();
    let mut pipeline = steps(&compute, &cfg);
    let mut ctx = context(&["az1", "az2"]);
    let mut ui = RecordingUi::new();

    let outcome = run_pipeline(&mut pipeline, &mut ctx, &mut ui).await;

    assert_eq!(outcome, StepAction::Continue);
    let published = ctx.server.map(|server| (server.id, server.state));
    assert_eq!(
        published,
        Some((String::from("srv-1"), String::from("ACTIVE")))
    );
    assert_eq!(compute.create_zones(), ["az1"]);
    assert!(
        compute.calls().contains(&ComputeCall::Delete {
            id: String::from("srv-1"),
            forced: false,
        }),
        "cleanup should delete the instance: {:?}",
        compute.calls()
    );
    assert!(ui.errors().is_empty(), "clean run: {:?}", ui.errors());
}

#[tokio::test]
async fn halted_run_still_reports_zone_progress_and_error() {
    let compute = ScriptedCompute::new();
    compute.push_create_err("quota exceeded in az1");
    compute.push_create_err("quota exceeded in az2");

    let cfg = config();
    let mut pipeline = steps(&compute, &cfg);
    let mut ctx = context(&["az1", "az2"]);
    let mut ui = RecordingUi::new();

    let outcome = run_pipeline(&mut pipeline, &mut ctx, &mut ui).await;

    assert_eq!(outcome, StepAction::Halt);
    let stored = ctx.error.map(|err| err.to_string()).unwrap_or_default();
    assert!(
        stored.contains("quota exceeded in az2"),
        "last error should be stored: {stored}"
    );
    let says = ui.says();
    assert!(
        says.iter().any(|text| text.contains("az1"))
            && says.iter().any(|text| text.contains("az2")),
        "zone-by-zone progress expected: {says:?}"
    );
    assert!(
        !ui.errors().is_empty(),
        "failed attempts must be reported through the sink"
    );
}

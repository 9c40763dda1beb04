use std::path::Path;

use blocksync::{Replay, Scenario, TickRecord, save_report};

use super::load_config;

pub(super) fn run_replay(
    scenario_path: &Path,
    config_path: Option<&Path>,
    ticks: Option<usize>,
    json: bool,
    report_path: Option<&Path>,
) -> Result<(), String> {
    let config = load_config(config_path)?;
    let scenario = Scenario::load(scenario_path).map_err(|e| e.to_string())?;
    if let Some(name) = &scenario.name {
        println!("Scenario: {}", name);
    }

    let mut replay = Replay::new(config, &scenario);
    for record in replay.run(&scenario, ticks) {
        if json {
            let line = serde_json::to_string(&record).map_err(|e| e.to_string())?;
            println!("{}", line);
        } else {
            print_tick(&record);
        }
    }

    let report = replay.report();
    println!("Action stats:");
    for (agent, stats) in &report.stats.per_agent {
        println!(
            "  {}: move={} grab={} drop={} open_door={} idle={}",
            agent,
            stats.move_count,
            stats.grab_count,
            stats.drop_count,
            stats.open_door_count,
            stats.idle_count
        );
    }
    if report.dropped_frames > 0 {
        println!("Dropped frames: {}", report.dropped_frames);
    }

    if let Some(path) = report_path {
        save_report(&report, path).map_err(|e| e.to_string())?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn print_tick(record: &TickRecord) {
    println!("Tick {} ({} messages)", record.tick, record.messages);
    for (agent, action) in &record.actions {
        let name = action.name.unwrap_or("None");
        if action.parameters.is_empty() {
            println!("  {:<12} {:<14} {}", agent, action.state, name);
        } else {
            let params = serde_json::Value::Object(action.parameters.clone());
            println!("  {:<12} {:<14} {} {}", agent, action.state, name, params);
        }
    }
}

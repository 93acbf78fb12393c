use prettytable::{Cell, Row, Table};

use crate::addon::{AddonConfig, driver::THINPOOL_LV, lifecycle::Plan};

pub fn log_addon(addon: &AddonConfig, lineno: usize) {
    tracing::info!("Section: line {lineno}");
    tracing::info!("Driver: {} ({})", addon.driver.name(), addon.driver.header_args());
    if let Some(vg) = addon.vgname() {
        tracing::info!("Thin pool: {vg}/{THINPOOL_LV}, fs={}", addon.fstype());
    }
    match addon.saved_args() {
        Some(args) => tracing::info!("Saved args: {}", args.join(" ")),
        None if addon.extra_args.is_empty() => {}
        None => tracing::info!("Extra args: {} (not saved)", addon.extra_args.join(" ")),
    }
}

pub fn log_plan(daemon_command: &[String], plan: &Plan) {
    tracing::info!("Daemon: {}", daemon_command.join(" "));

    let mut table = Table::new();
    table.set_titles(Row::new(vec![
        Cell::new("File"),
        Cell::new("Mode"),
        Cell::new("Content"),
    ]));

    for w in &plan.writes {
        let mode = if w.append { "append" } else { "write" };
        table.add_row(Row::new(vec![
            Cell::new(&w.path.display().to_string()),
            Cell::new(mode),
            Cell::new(w.content.trim_end()),
        ]));
    }

    let merged = match &plan.saved_args {
        Some(args) => format!("OPTIONS += {}", args.join(" ")),
        None => "OPTIONS".to_string(),
    };
    table.add_row(Row::new(vec![
        Cell::new(&plan.options_file.display().to_string()),
        Cell::new("merge"),
        Cell::new(&merged),
    ]));

    table.printstd();
}

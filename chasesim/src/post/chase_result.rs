use crate::core::powerup::PowerUpKind;
use crate::core::vehicle::Role;
use crate::decision::Controller;
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write;
use std::io::Write as IoWrite;
use std::path::Path;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Thief,
    Police,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Winner::Thief => write!(f, "thief"),
            Winner::Police => write!(f, "police"),
        }
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChaseEventKind {
    PowerUpCollected(PowerUpKind),
    Crash,
    Roadblock,
    Capture,
    Finish,
    TickLimit,
}

impl fmt::Display for ChaseEventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChaseEventKind::PowerUpCollected(kind) => write!(f, "collected {}", kind),
            ChaseEventKind::Crash => write!(f, "crash"),
            ChaseEventKind::Roadblock => write!(f, "roadblock crash"),
            ChaseEventKind::Capture => write!(f, "capture"),
            ChaseEventKind::Finish => write!(f, "finish"),
            ChaseEventKind::TickLimit => write!(f, "tick limit"),
        }
    }
}

/// ChaseEvent is one entry of the event log. `role` is empty for events that concern the chase as
/// a whole (tick limit).
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChaseEvent {
    pub tick: u64,
    pub role: Option<Role>,
    pub kind: ChaseEventKind,
    pub distance: f64,
}

/// Per-role counters collected during a chase.
#[derive(Debug, Serialize, Clone, Default)]
pub struct RoleStats {
    pub powerups_collected: u32,
    pub crashes: u32,
    pub controller_usage: BTreeMap<Controller, u64>,
}

impl RoleStats {
    pub fn record_controller(&mut self, controller: Controller) {
        *self.controller_usage.entry(controller).or_insert(0) += 1;
    }
}

/// One row of the per-tick trace.
#[derive(Debug, Serialize, Clone)]
pub struct TickRecord {
    pub tick: u64,
    pub thief_x: f64,
    pub thief_distance: f64,
    pub thief_speed: f64,
    pub thief_controller: Controller,
    pub police_x: f64,
    pub police_distance: f64,
    pub police_speed: f64,
    pub police_controller: Controller,
}

/// ChaseResult contains all chase information that is required for post-processing.
#[derive(Debug, Serialize, Clone)]
pub struct ChaseResult {
    pub seed: u64,
    pub winner: Option<Winner>,
    pub ticks: u64,
    pub thief_distance: f64,
    pub police_distance: f64,
    pub finish_distance: f64,
    pub thief: RoleStats,
    pub police: RoleStats,
    pub events: Vec<ChaseEvent>,
    #[serde(skip)]
    pub trace: Vec<TickRecord>,
}

impl ChaseResult {
    fn summary(&self) -> Result<String, fmt::Error> {
        let mut content = String::new();

        writeln!(&mut content, "RESULT: Chase summary (seed {})", self.seed)?;
        match self.winner {
            Some(winner) => writeln!(&mut content, "winner: {}", winner)?,
            None => writeln!(&mut content, "winner: none (tick limit reached)")?,
        }
        writeln!(
            &mut content,
            "ticks: {} ({:.1}s)",
            self.ticks,
            self.ticks as f64 / crate::core::chase::TICKS_PER_SECOND as f64
        )?;
        writeln!(
            &mut content,
            "distance: thief {:.0}, police {:.0}, finish {:.0}",
            self.thief_distance, self.police_distance, self.finish_distance
        )?;

        for (role, stats) in [(Role::Thief, &self.thief), (Role::Police, &self.police)].iter() {
            write!(
                &mut content,
                "{:6}: {:2} power-ups, {:2} crashes, controllers",
                role.to_string(),
                stats.powerups_collected,
                stats.crashes
            )?;
            for (controller, count) in stats.controller_usage.iter() {
                write!(&mut content, " {}={}", controller, count)?;
            }
            writeln!(&mut content)?;
        }

        writeln!(&mut content, "RESULT: Events")?;
        for event in self.events.iter() {
            match event.role {
                Some(role) => writeln!(
                    &mut content,
                    "{:6} {:6} {} at {:.0}",
                    event.tick, role.to_string(), event.kind, event.distance
                )?,
                None => writeln!(
                    &mut content,
                    "{:6} {:6} {} at {:.0}",
                    event.tick, "-", event.kind, event.distance
                )?,
            }
        }

        Ok(content)
    }

    /// print_summary prints the winner, the per-role statistics and the event log to the console
    /// output.
    pub fn print_summary(&self) -> anyhow::Result<()> {
        let content = self.summary().context("Failed to format chase summary!")?;
        print!("{}", content);
        Ok(())
    }

    /// write_summary_to_file writes the same summary as print_summary to a text file.
    pub fn write_summary_to_file(&self, filepath: &Path) -> anyhow::Result<()> {
        let content = self.summary().context("Failed to format chase summary!")?;

        if let Some(parent) = filepath.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context(format!(
                    "Failed to create output directory {}!",
                    parent.display()
                ))?;
            }
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(filepath)
            .context(format!("Failed to open file {}!", filepath.display()))?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// write_trace_to_csv writes the per-tick trace (if it was recorded) as CSV file.
    pub fn write_trace_to_csv(&self, filepath: &Path) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(filepath)
            .context(format!("Failed to open file {}!", filepath.display()))?;

        for record in self.trace.iter() {
            writer
                .serialize(record)
                .context("Failed to serialize trace record!")?;
        }
        writer.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ChaseResult {
        let mut thief = RoleStats::default();
        thief.powerups_collected = 1;
        thief.record_controller(Controller::AStar);
        thief.record_controller(Controller::AStar);
        thief.record_controller(Controller::Fuzzy);

        ChaseResult {
            seed: 3,
            winner: Some(Winner::Police),
            ticks: 120,
            thief_distance: 900.0,
            police_distance: 880.0,
            finish_distance: 50_000.0,
            thief,
            police: RoleStats::default(),
            events: vec![
                ChaseEvent {
                    tick: 40,
                    role: Some(Role::Thief),
                    kind: ChaseEventKind::PowerUpCollected(PowerUpKind::Boost),
                    distance: 300.0,
                },
                ChaseEvent {
                    tick: 120,
                    role: Some(Role::Police),
                    kind: ChaseEventKind::Capture,
                    distance: 880.0,
                },
            ],
            trace: vec![TickRecord {
                tick: 1,
                thief_x: 416.0,
                thief_distance: 0.2,
                thief_speed: 0.2,
                thief_controller: Controller::AStar,
                police_x: 416.0,
                police_distance: -299.78,
                police_speed: 0.22,
                police_controller: Controller::AStar,
            }],
        }
    }

    #[test]
    fn summary_lists_winner_usage_and_events() {
        let summary = sample_result().summary().unwrap();
        assert!(summary.contains("winner: police"));
        assert!(summary.contains("controllers fuzzy=1 astar=2"));
        assert!(summary.contains("collected boost"));
        assert!(summary.contains("capture at 880"));
    }

    #[test]
    fn summary_and_trace_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample_result();

        let summary_path = dir.path().join("out").join("summary.txt");
        result.write_summary_to_file(&summary_path).unwrap();
        let written = std::fs::read_to_string(&summary_path).unwrap();
        assert!(written.starts_with("RESULT: Chase summary (seed 3)"));

        let trace_path = dir.path().join("trace.csv");
        result.write_trace_to_csv(&trace_path).unwrap();
        let csv_content = std::fs::read_to_string(&trace_path).unwrap();
        let mut lines = csv_content.lines();
        assert!(lines.next().unwrap().starts_with("tick,thief_x,thief_distance"));
        assert!(lines.next().unwrap().contains("astar"));
    }
}

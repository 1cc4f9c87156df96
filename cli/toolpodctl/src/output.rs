//! Output formatting for CLI commands.

use std::str::FromStr;

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};
use toolpod_manifest::{Composition, Container};

use crate::driver::{DeleteOutcome, DeleteReport};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}' (expected table or json)")),
        }
    }
}

/// Print data in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                let table = Table::new(data).to_string();
                println!("{}", table);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string());
            println!("{}", json);
        }
    }
}

/// Print a single item as JSON.
pub fn print_single<T: Serialize>(data: &T) {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    println!("{}", json);
}

/// Sections of a JSON-mode run, printed together as one document.
///
/// A single section is printed bare; several are printed as one object keyed
/// by section name.
#[derive(Debug, Default)]
pub struct JsonReport {
    sections: serde_json::Map<String, serde_json::Value>,
}

impl JsonReport {
    pub fn push(&mut self, section: &str, value: serde_json::Value) {
        self.sections.insert(section.to_string(), value);
    }

    /// The document to print, if any section was collected.
    pub fn document(&self) -> Option<serde_json::Value> {
        match self.sections.len() {
            0 => None,
            1 => self.sections.values().next().cloned(),
            _ => Some(serde_json::Value::Object(self.sections.clone())),
        }
    }

    /// Print the document once, then forget the sections.
    pub fn print(&mut self) {
        if let Some(document) = self.document() {
            print_single(&document);
        }
        self.sections.clear();
    }
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

/// One row of the rendered container summary.
#[derive(Debug, Serialize, Tabled)]
pub struct ContainerRow {
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "IMAGE")]
    pub image: String,
    #[tabled(rename = "CPU")]
    pub cpu: String,
    #[tabled(rename = "MEMORY")]
    pub memory: String,
    #[tabled(rename = "PORTS")]
    pub ports: String,
    #[tabled(rename = "PROBE")]
    pub probe: String,
}

impl From<&Container> for ContainerRow {
    fn from(c: &Container) -> Self {
        let (cpu, memory) = match &c.resources {
            Some(r) => (r.limits.cpu.clone(), r.limits.memory.clone()),
            None => ("-".to_string(), "-".to_string()),
        };
        let ports = if c.ports.is_empty() {
            "-".to_string()
        } else {
            c.ports
                .iter()
                .map(|p| format!("{}/{}", p.container_port, p.protocol))
                .collect::<Vec<_>>()
                .join(",")
        };
        let probe = match &c.liveness_probe {
            Some(p) => format!("exec ({}s)", p.timeout_seconds),
            None => "-".to_string(),
        };

        Self {
            name: c.name.clone(),
            image: c.image.clone(),
            cpu,
            memory,
            ports,
            probe,
        }
    }
}

/// Summary rows for a composition.
pub fn container_rows(composition: &Composition) -> Vec<ContainerRow> {
    composition
        .deployment
        .spec
        .template
        .spec
        .containers
        .iter()
        .map(ContainerRow::from)
        .collect()
}

/// One row of a delete report.
#[derive(Debug, Serialize, Tabled)]
pub struct DeleteRow {
    #[tabled(rename = "KIND")]
    pub kind: String,
    #[tabled(rename = "NAME")]
    pub name: String,
    #[tabled(rename = "RESULT")]
    pub result: String,
    #[tabled(rename = "DETAIL")]
    pub detail: String,
}

pub fn delete_rows(report: &DeleteReport) -> Vec<DeleteRow> {
    report
        .entries
        .iter()
        .map(|(target, outcome)| DeleteRow {
            kind: target.kind.to_string(),
            name: target.name.clone(),
            result: outcome.label().to_string(),
            detail: match outcome {
                DeleteOutcome::Deleted(ack) => ack.output.clone(),
                DeleteOutcome::Absent(diagnostics) => diagnostics.clone(),
                DeleteOutcome::Failed(err) => err.to_string(),
            },
        })
        .collect()
}

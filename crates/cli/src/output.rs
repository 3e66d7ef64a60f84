//! Output formatting for CLI responses

use std::collections::BTreeMap;

use anyhow::Error;
use colored::Colorize;
use opp_gen2_platform::{BoardInfo, CardCounts};
use serde::Serialize;
use serde_json::json;

use crate::error::CliError;

#[derive(Debug, Clone, Serialize)]
pub struct BoardReport {
    pub addr: String,
    pub card: u8,
    pub wings: Vec<String>,
    pub version: Option<String>,
}

impl From<&BoardInfo> for BoardReport {
    fn from(board: &BoardInfo) -> Self {
        Self {
            addr: format!("{:#04x}", board.addr),
            card: board.card(),
            wings: board.wings.iter().map(|w| format!("{w:?}")).collect(),
            version: board.version.map(|v| v.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CardReport {
    pub solenoid: usize,
    pub input: usize,
    pub matrix: usize,
    pub incand: usize,
    pub neopixel: usize,
}

impl From<CardCounts> for CardReport {
    fn from(counts: CardCounts) -> Self {
        Self {
            solenoid: counts.solenoid,
            input: counts.input,
            matrix: counts.matrix,
            incand: counts.incand,
            neopixel: counts.neopixel,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub chain: String,
    pub firmware: Option<String>,
    pub boards: Vec<BoardReport>,
    pub cards: CardReport,
}

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": error.to_string(),
        }
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format error as JSON: {e}"),
    }
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

pub fn print_probe(chains: &[ChainReport], json: bool) -> Result<(), CliError> {
    if json {
        let output = json!({
            "success": true,
            "chains": chains,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for chain in chains {
        println!(
            "{} {} (firmware {})",
            "Chain".bold(),
            chain.chain.cyan(),
            chain.firmware.as_deref().unwrap_or("unknown")
        );
        if chain.boards.is_empty() {
            println!("  {}", "No boards found".yellow());
            continue;
        }
        for board in &chain.boards {
            println!(
                "  card {:>2}  addr {}  wings [{}]  version {}",
                board.card,
                board.addr,
                board.wings.join(", "),
                board.version.as_deref().unwrap_or("-")
            );
        }
        let cards = chain.cards;
        println!(
            "  cards: {} solenoid, {} input, {} matrix, {} incandescent, {} neopixel",
            cards.solenoid, cards.input, cards.matrix, cards.incand, cards.neopixel
        );
    }
    Ok(())
}

pub fn print_switches(states: &BTreeMap<String, u8>, json: bool) -> Result<(), CliError> {
    if json {
        let output = json!({
            "success": true,
            "switches": states,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if states.is_empty() {
        println!("{}", "No switches found".yellow());
        return Ok(());
    }
    for (number, state) in states {
        let label = if *state == 1 {
            "active".green()
        } else {
            "inactive".dimmed()
        };
        println!("{number:<10} {label}");
    }
    Ok(())
}

/// One switch edge per line.
pub fn print_edge(number: &str, state: u8, json: bool) {
    if json {
        println!("{}", json!({ "switch": number, "state": state }));
    } else if state == 1 {
        println!("{number:<10} {}", "closed".green());
    } else {
        println!("{number:<10} {}", "open".dimmed());
    }
}

pub fn print_success(message: &str, json: bool) -> Result<(), CliError> {
    if json {
        let output = json!({
            "success": true,
            "message": message,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{} {}", "✓".green(), message);
    }
    Ok(())
}

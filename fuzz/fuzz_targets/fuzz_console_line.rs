//! Fuzz target: console line parsing
//!
//! Feeds arbitrary UTF-8 lines through the command parser and, for the
//! table-replacing verbs, through the JSON payload validators.
//!
//! Invariants checked:
//! - No panics under any input
//! - `beep` never carries more than `MAX_BEEPS`
//! - Any accepted table passes validation and re-serialises to JSON the
//!   parser accepts again
//!
//! cargo fuzz run fuzz_console_line

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartgreen::app::commands::{ConsoleCommand, MAX_BEEPS};
use smartgreen::app::payload::{alarms_json, parse_alarms, parse_plants, plants_json};
use smartgreen::config::{validate_alarms, validate_plants};

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    match ConsoleCommand::parse(line) {
        ConsoleCommand::Beep(n) => assert!(n >= 1 && n <= MAX_BEEPS),
        ConsoleCommand::SetAlarms(json) => {
            if let Ok(table) = parse_alarms(&json) {
                assert!(validate_alarms(&table).is_ok());
                assert_eq!(parse_alarms(&alarms_json(&table)).ok(), Some(table));
            }
        }
        ConsoleCommand::SetPlants(json) => {
            if let Ok(table) = parse_plants(&json) {
                assert!(validate_plants(&table).is_ok());
                assert_eq!(parse_plants(&plants_json(&table)).ok(), Some(table));
            }
        }
        _ => {}
    }
});

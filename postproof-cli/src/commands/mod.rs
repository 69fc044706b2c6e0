//! CLI subcommands.

pub mod fingerprint;
pub mod info;
pub mod stamp;
pub mod upgrade;
pub mod verify;

use anyhow::Result;
use postproof_core::chain::calendar::{CalendarConfig, CalendarProofAdapter};

/// Calendar adapter over `calendars`, or the public calendars when empty.
pub(crate) fn calendar_adapter(
    calendars: Vec<String>,
    esplora_url: Option<String>,
) -> Result<CalendarProofAdapter> {
    let mut config = CalendarConfig::default();
    if !calendars.is_empty() {
        config.calendar_urls = calendars;
    }
    if let Some(url) = esplora_url {
        config.esplora_url = url;
    }
    Ok(CalendarProofAdapter::from_config(config)?)
}

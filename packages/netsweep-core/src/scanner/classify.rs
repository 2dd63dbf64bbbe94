//! Device classification.
//!
//! A [`RuleSet`] is an ordered list of (predicate, category) pairs; the first
//! predicate that matches decides the category. [`RuleSet::default`] is the
//! stock chain:
//!
//! | # | rule           | category             |
//! |---|----------------|----------------------|
//! | 1 | printer hint   | `Printer`            |
//! | 2 | VoIP vendor + 5060 | `VoIPPhone`      |
//! | 3 | mobile vendor  | `SmartphoneOrTablet` |
//! | 4 | appliance vendor + any open port | `SmartTVOrAndroid` |
//! | 5 | 5060 open      | `VoIPPhone`          |
//! | 6 | 554 open       | `RTSPCamera`         |
//! | 7 | 9100 open      | `Printer`            |
//! | 8 | 445 or 139 open | `WindowsPC`         |
//! | 9 | 22 open        | `LinuxDevice`        |
//! | 10 | nothing open  | `OfflineDevice`      |
//! | 11 | anything else | `OtherDevice`        |
//!
//! Rules 1 and 7 both yield `Printer` from different signals. Both stay, in
//! this order.

use super::ping::OsFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    Printer,
    VoIPPhone,
    SmartphoneOrTablet,
    SmartTVOrAndroid,
    RTSPCamera,
    WindowsPC,
    LinuxDevice,
    OfflineDevice,
    OtherDevice,
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceCategory::Printer => "Printer",
            DeviceCategory::VoIPPhone => "VoIP Phone",
            DeviceCategory::SmartphoneOrTablet => "Smartphone/Tablet",
            DeviceCategory::SmartTVOrAndroid => "Smart TV/Android",
            DeviceCategory::RTSPCamera => "RTSP Camera",
            DeviceCategory::WindowsPC => "Windows PC",
            DeviceCategory::LinuxDevice => "Linux Device",
            DeviceCategory::OfflineDevice => "Offline Device",
            DeviceCategory::OtherDevice => "Other Device",
        };
        f.write_str(label)
    }
}

/// Signals the rules look at.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyInput<'a> {
    pub vendor: &'a str,
    pub open_ports: &'a BTreeSet<u16>,
    pub printer_hint: bool,
    pub os_hint: OsFamily,
}

impl ClassifyInput<'_> {
    pub fn has_port(&self, port: u16) -> bool {
        self.open_ports.contains(&port)
    }
}

type Predicate = Arc<dyn Fn(&ClassifyInput<'_>) -> bool + Send + Sync>;

/// One entry of the chain.
#[derive(Clone)]
pub struct Rule {
    name: String,
    predicate: Predicate,
    category: DeviceCategory,
}

impl Rule {
    pub fn new<F>(name: impl Into<String>, category: DeviceCategory, predicate: F) -> Self
    where
        F: Fn(&ClassifyInput<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            category,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> DeviceCategory {
        self.category
    }

    pub fn matches(&self, input: &ClassifyInput<'_>) -> bool {
        (self.predicate)(input)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

/// Result of running the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: DeviceCategory,
    /// Name of the rule that matched, or `"fallback"`.
    pub rule: String,
}

/// Category used when no rule in a custom chain matches.
pub const FALLBACK_CATEGORY: DeviceCategory = DeviceCategory::OtherDevice;

#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Append a rule at the lowest precedence.
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Insert `rule` directly ahead of the rule named `before`.
    /// Returns `false` (and leaves the chain untouched) if no such rule exists.
    pub fn insert_before(&mut self, before: &str, rule: Rule) -> bool {
        match self.rules.iter().position(|r| r.name == before) {
            Some(idx) => {
                self.rules.insert(idx, rule);
                true
            }
            None => false,
        }
    }

    /// First matching rule wins.
    pub fn classify(&self, input: &ClassifyInput<'_>) -> Classification {
        self.rules
            .iter()
            .find(|r| r.matches(input))
            .map(|r| Classification {
                category: r.category,
                rule: r.name.clone(),
            })
            .unwrap_or_else(|| Classification {
                category: FALLBACK_CATEGORY,
                rule: "fallback".to_string(),
            })
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        use DeviceCategory::*;

        Self {
            rules: vec![
                Rule::new("printer-hint", Printer, |i| i.printer_hint),
                Rule::new("voip-vendor-sip", VoIPPhone, |i| {
                    is_voip_vendor(i.vendor) && i.has_port(5060)
                }),
                Rule::new("mobile-vendor", SmartphoneOrTablet, |i| is_mobile_vendor(i.vendor)),
                Rule::new("appliance-vendor", SmartTVOrAndroid, |i| {
                    is_appliance_vendor(i.vendor) && !i.open_ports.is_empty()
                }),
                Rule::new("sip", VoIPPhone, |i| i.has_port(5060)),
                Rule::new("rtsp", RTSPCamera, |i| i.has_port(554)),
                Rule::new("jetdirect", Printer, |i| i.has_port(9100)),
                Rule::new("smb", WindowsPC, |i| i.has_port(445) || i.has_port(139)),
                Rule::new("ssh", LinuxDevice, |i| i.has_port(22)),
                Rule::new("no-open-ports", OfflineDevice, |i| i.open_ports.is_empty()),
                Rule::new("other", OtherDevice, |_| true),
            ],
        }
    }
}

static DEFAULT_RULES: LazyLock<RuleSet> = LazyLock::new(RuleSet::default);

/// Classify with the stock rule chain.
pub fn classify(
    vendor: &str,
    open_ports: &BTreeSet<u16>,
    printer_hint: bool,
    os_hint: OsFamily,
) -> DeviceCategory {
    DEFAULT_RULES
        .classify(&ClassifyInput {
            vendor,
            open_ports,
            printer_hint,
            os_hint,
        })
        .category
}

const PRINTER_VENDORS: &[&str] = &[
    "hewlett packard",
    "hp inc",
    "canon",
    "epson",
    "brother industries",
    "xerox",
    "lexmark",
    "ricoh",
    "konica",
    "kyocera",
    "zebra technologies",
];

const VOIP_VENDORS: &[&str] = &[
    "fanvil",
    "yealink",
    "grandstream",
    "polycom",
    "snom",
    "avaya",
    "mitel",
    "aastra",
    "gigaset",
    "htek",
    "escene",
    "akuvox",
];

const MOBILE_VENDORS: &[&str] = &[
    "apple",
    "samsung",
    "xiaomi",
    "huawei",
    "oneplus",
    "oppo",
    "vivo mobile",
    "motorola mobility",
    "realme",
    "honor device",
];

const APPLIANCE_VENDORS: &[&str] = &[
    "lg electronics",
    "sony",
    "tcl",
    "hisense",
    "vizio",
    "roku",
    "amazon",
    "google",
    "tp vision",
    "sharp",
    "panasonic",
    "skyworth",
];

fn vendor_matches(vendor: &str, keywords: &[&str]) -> bool {
    let vendor_lower = vendor.to_lowercase();
    keywords.iter().any(|k| vendor_lower.contains(k))
}

pub fn is_printer_vendor(vendor: &str) -> bool {
    vendor_matches(vendor, PRINTER_VENDORS)
}

pub fn is_voip_vendor(vendor: &str) -> bool {
    vendor_matches(vendor, VOIP_VENDORS)
}

pub fn is_mobile_vendor(vendor: &str) -> bool {
    vendor_matches(vendor, MOBILE_VENDORS)
}

pub fn is_appliance_vendor(vendor: &str) -> bool {
    vendor_matches(vendor, APPLIANCE_VENDORS)
}

/// Explicit print-service signal: a printer manufacturer, or IPP (631) / LPD (515) open.
pub fn printer_hint(vendor: &str, open_ports: &BTreeSet<u16>) -> bool {
    is_printer_vendor(vendor) || open_ports.contains(&631) || open_ports.contains(&515)
}

//! # Topic Routing - Event Classes and Routing Keys
//!
//! ## Purpose
//!
//! Every event on the bus is addressed by a dot-separated routing key whose
//! first segment is the [`EventClass`]:
//!
//! ```text
//! CtlOFPEvent.<version>.<msg_type>[.<dpid>]   switch → applications (raw OpenFlow)
//! AppOFPEvent.<version>.<msg_type>            applications → controller
//! CtlTEvent.<name>                            controller signals (switch.connected, ...)
//! AppTEvent.<name>                            application → application signals
//! ```
//!
//! ## Subscription Patterns
//!
//! Topic-exchange semantics:
//! - **Exact**: `CtlOFPEvent.4.10.42` → packet-in from dpid 42 only
//! - **`*`**: exactly one segment, `CtlOFPEvent.*.10.*` → packet-in, any version, any dpid
//! - **`#`**: zero or more segments, `CtlOFPEvent.6.#` → every OpenFlow 1.5 event
//!
//! ## Matching Algorithm
//!
//! ```text
//! pattern segment "#"   → try consuming 0..=remaining key segments
//! pattern segment "*"   → consume exactly one key segment
//! literal               → must equal the next key segment
//! ```

use std::fmt;

/// Segment separator in routing keys
pub const SEPARATOR: char = '.';

/// Control-plane event names published under [`EventClass::CtlTEvent`]
pub mod control {
    pub const SWITCH_CONNECTED: &str = "switch.connected";
    pub const SWITCH_DISCONNECTED: &str = "switch.disconnected";
    pub const HANDSHAKE_FAILED: &str = "switch.handshake_failed";
    pub const SWITCH_UNRESPONSIVE: &str = "switch.unresponsive";
}

/// First segment of every routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    /// OpenFlow messages from the controller to applications
    CtlOFPEvent,
    /// OpenFlow messages from applications to the controller
    AppOFPEvent,
    /// Generic signals from the controller to applications
    CtlTEvent,
    /// Generic signals between applications
    AppTEvent,
}

impl EventClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventClass::CtlOFPEvent => "CtlOFPEvent",
            EventClass::AppOFPEvent => "AppOFPEvent",
            EventClass::CtlTEvent => "CtlTEvent",
            EventClass::AppTEvent => "AppTEvent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CtlOFPEvent" => Some(EventClass::CtlOFPEvent),
            "AppOFPEvent" => Some(EventClass::AppOFPEvent),
            "CtlTEvent" => Some(EventClass::CtlTEvent),
            "AppTEvent" => Some(EventClass::AppTEvent),
            _ => None,
        }
    }

    /// `<Class>.#`, every event of this class
    pub fn wildcard(&self) -> String {
        format!("{}{}#", self.as_str(), SEPARATOR)
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields of an OpenFlow event routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfpKey {
    pub class: EventClass,
    pub version: u8,
    pub msg_type: u8,
    pub dpid: Option<u64>,
}

/// A concrete (wildcard-free) routing key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// `CtlOFPEvent.<version>.<msg_type>[.<dpid>]`
    pub fn ofp_event(version: u8, msg_type: u8, dpid: Option<u64>) -> Self {
        let mut key = format!("{}.{}.{}", EventClass::CtlOFPEvent, version, msg_type);
        if let Some(dpid) = dpid {
            key.push(SEPARATOR);
            key.push_str(&dpid.to_string());
        }
        Self(key)
    }

    /// `AppOFPEvent.<version>.<msg_type>`
    pub fn app_ofp_event(version: u8, msg_type: u8) -> Self {
        Self(format!("{}.{}.{}", EventClass::AppOFPEvent, version, msg_type))
    }

    /// `CtlTEvent.<name>`
    pub fn control(name: &str) -> Self {
        Self(format!("{}.{}", EventClass::CtlTEvent, name))
    }

    /// `AppTEvent.<name>`
    pub fn app_event(name: &str) -> Self {
        Self(format!("{}.{}", EventClass::AppTEvent, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Event class of a routing key string
    pub fn class_of(key: &str) -> Option<EventClass> {
        key.split(SEPARATOR).next().and_then(EventClass::parse)
    }

    /// Split an OpenFlow event key back into its fields
    pub fn parse_ofp(key: &str) -> Option<OfpKey> {
        let mut segments = key.split(SEPARATOR);
        let class = EventClass::parse(segments.next()?)?;
        if !matches!(class, EventClass::CtlOFPEvent | EventClass::AppOFPEvent) {
            return None;
        }
        let version = segments.next()?.parse().ok()?;
        let msg_type = segments.next()?.parse().ok()?;
        let dpid = match segments.next() {
            Some(s) => Some(s.parse().ok()?),
            None => None,
        };
        if segments.next().is_some() {
            return None;
        }
        Some(OfpKey {
            class,
            version,
            msg_type,
            dpid,
        })
    }

    /// Name part of a `CtlTEvent`/`AppTEvent` key (`switch.connected`)
    pub fn event_name(key: &str) -> Option<&str> {
        let (class, name) = key.split_once(SEPARATOR)?;
        match EventClass::parse(class)? {
            EventClass::CtlTEvent | EventClass::AppTEvent => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoutingKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `<Class>.<version>.#`
pub fn version_wildcard(class: EventClass, version: u8) -> String {
    format!("{}.{}.#", class, version)
}

/// `<Class>.*.<msg_type>.*`, one message type from every dpid
pub fn type_wildcard(class: EventClass, msg_type: u8) -> String {
    format!("{}.*.{}.*", class, msg_type)
}

/// Check a subscription pattern for empty segments
pub fn is_valid_pattern(pattern: &str) -> bool {
    !pattern.is_empty() && pattern.split(SEPARATOR).all(|s| !s.is_empty())
}

/// Topic-exchange match of `key` against `pattern`
pub fn topic_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split(SEPARATOR).collect();
    let key: Vec<&str> = key.split(SEPARATOR).collect();
    match_segments(&pattern, &key)
}

fn match_segments(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => {
            if rest.is_empty() {
                return true;
            }
            (0..=key.len()).any(|skip| match_segments(rest, &key[skip..]))
        }
        Some((&"*", rest)) => !key.is_empty() && match_segments(rest, &key[1..]),
        Some((segment, rest)) => key.first() == Some(segment) && match_segments(rest, &key[1..]),
    }
}

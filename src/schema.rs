//! Static schema table for the pipe-delimited statistics sources.
//!
//! Each source kind produced by the platform has a fixed column order. A
//! [`Schema`] describes that order once: every column gets a decode kind and a
//! role. Roles drive the rest of the pipeline generically — `Label` columns
//! become series labels, `Value` columns become gauges, `Ignore` columns are
//! decoded and dropped (timestamps and free-form list columns). Adding a new
//! source kind is a table change, not a code change.

use thiserror::Error;

/// Metric namespace shared by every exported series.
pub const NAMESPACE: &str = "p2p";

/// Lookup failure for [`SchemaTable::get`].
#[derive(Debug, Error)]
#[error("unknown source kind: '{0}'")]
pub struct UnknownSourceKind(pub String);

/// How a raw token is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Kept verbatim.
    Str,
    /// Parsed as a signed integer; unparsable tokens decode to `0`.
    Int,
    /// Parsed as a float; unparsable tokens decode to `0.0`.
    Float,
}

/// What a decoded field contributes to the exported series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Series label, exported under the given label name.
    Label(&'static str),
    /// Gauge value, exported under the given metric name.
    Value {
        metric: &'static str,
        help: &'static str,
    },
    /// Decoded but not exported.
    Ignore,
}

/// One column of a source record.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub role: FieldRole,
}

const fn skip(name: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        name,
        kind: FieldKind::Str,
        role: FieldRole::Ignore,
    }
}

const fn label(name: &'static str, label: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        name,
        kind: FieldKind::Str,
        role: FieldRole::Label(label),
    }
}

const fn gauge(name: &'static str, metric: &'static str, help: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        name,
        kind: FieldKind::Int,
        role: FieldRole::Value { metric, help },
    }
}

/// Immutable description of one source kind.
///
/// `name` is the configuration key; `subsystem` is the Prometheus subsystem
/// (and line-protocol measurement suffix). The number of fields must equal
/// the number of `|`-delimited tokens of every conforming record line.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub subsystem: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl Schema {
    /// Label names in field order.
    pub fn label_names(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter_map(|f| match f.role {
                FieldRole::Label(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    /// Value-field descriptors in field order, with their field index.
    pub fn value_fields(&self) -> impl Iterator<Item = (usize, &FieldDescriptor)> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| matches!(f.role, FieldRole::Value { .. }))
    }

    /// Field indices of label columns, in field order.
    pub fn label_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| matches!(f.role, FieldRole::Label(_)))
            .map(|(i, _)| i)
    }

    /// Index of a field by its column name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

// =============================================================================
// Source schemas
// =============================================================================
//
// Column orders mirror the statistics feed documentation. Metric and label
// spellings are part of the deployed metric contract and are kept exactly,
// including historical misspellings ("heathy", "CAHCE", "succed").

/// Service publication summary, one record per service instance.
pub static SERVER_SUMMARY: Schema = Schema {
    name: "server_summary",
    subsystem: "serverSummary",
    fields: &[
        skip("time"),
        label("node_id", "NodeID"),
        label("svc_type", "SvcType"),
        label("ip", "IP"),
        label("port", "Port"),
        label("host_id", "HostID"),
        gauge("published", "published", "is service published."),
        gauge("healthy", "healthy", "is service healthy."),
    ],
};

/// System-wide online-user counters, a single unlabeled record.
pub static USER_STATISTIC: Schema = Schema {
    name: "user_statistic",
    subsystem: "userStatistic",
    fields: &[
        skip("time"),
        gauge("online", "online", "sum of online user"),
        gauge("anonym", "anonym", "sum of online anonym-user"),
        gauge("activable", "activable", "sum of activable user"),
        gauge("login", "new_login", "increased login user."),
        gauge("logout", "new_logout", "decreased login user."),
        skip("terminal_breakdown"),
    ],
};

/// System-wide call counters, a single unlabeled record.
pub static CALL_STATISTIC: Schema = Schema {
    name: "call_statistic",
    subsystem: "callStatistic",
    fields: &[
        skip("time"),
        gauge("onphone", "onphone", "sum of onphone user"),
        gauge("onphone_video", "onphone_video", "sum of onphone video user"),
        gauge("onphone_audio", "onphone_audio", "sum of onphone audio user"),
        gauge("traffic", "new_traffic", "increased sum of call traffic"),
        gauge("blocked", "new_blocked_call", "increased sum of blocked-call"),
        gauge("released", "new_released_call", "increased sum of released-call"),
        gauge("broken", "new_broken_call", "increased sum of broken-call"),
    ],
};

/// HOST service runtime stats, one record per host node.
pub static HOST: Schema = Schema {
    name: "host",
    subsystem: "host",
    fields: &[
        skip("time"),
        label("host_id", "HostID"),
        label("ip", "IP"),
        label("port", "Port"),
        gauge("healthy", "heathy", "heathy or not"),
        gauge("fixed_user", "fixed_user", "sum of fixed user"),
        gauge("online_user", "online_user", "sum of online user"),
        gauge("online_seat", "online_seat", "sum of online seat"),
        gauge("online_anonym", "online_anonym", "sum of online anonym user"),
        gauge("untreated_task", "untreated_task", "sum of untreated task"),
        gauge("login", "new_login", "increased sum of login"),
        gauge("logout", "new_logout", "increased sum of logout"),
        gauge("login_user", "new_login_user", "increased sum of login-user"),
        gauge("logout_user", "new_logout_user", "increased sum of logout-user"),
        gauge("query_called", "new_query_called", "increased sum of querying called"),
        gauge(
            "query_called_local",
            "new_query_called_success",
            "increased sum of success to query called",
        ),
        gauge(
            "query_called_dht",
            "new_query_called_DHT",
            "increased sum of query called DHT",
        ),
        gauge("relay_msg", "new_relay_msg", "increased sum of relay message"),
        gauge(
            "relay_msg_cache_hit",
            "new_relay_msg_CAHCE_success",
            "increased sum of succes to relay CAHCE message",
        ),
        gauge(
            "relay_msg_query_dht",
            "new_relay_msg_query_DHT",
            "increased sum of query DHT for relay message",
        ),
        gauge(
            "relay_msg_local_hit",
            "new_relay_msg_local_success",
            "increased sum of succes to relay local message",
        ),
        gauge("seat_msg", "new_relay_seat_msg", "increased sum of relay seat message"),
        gauge(
            "user_queue_pos_msg",
            "new_relay_user_pos_msg",
            "increased sum of relay user queue pos message",
        ),
        gauge("push_apns", "new_push_APNS", "increased sum of push APNS"),
        gauge("push_silent", "new_push_silent", "increased sum of push silent"),
        skip("device_breakdown"),
    ],
};

/// RELAY service runtime stats, one record per live relay node.
pub static RELAY: Schema = Schema {
    name: "relay",
    subsystem: "relay",
    fields: &[
        skip("time"),
        label("relay_id", "RelayId"),
        label("ip", "IP"),
        label("port", "Port"),
        gauge("onphone", "onphone", "sum of onphone link"),
        gauge("onconnect", "onconnect", "sum of onconnect link"),
        gauge(
            "short_live_msg",
            "new_short_living_msg",
            "increased sum of short living msg",
        ),
        gauge("building_msg", "new_building_msg", "increased sum of building msg."),
        gauge("media_packet", "new_media_packet", "increased sum of media packet"),
        gauge("invalid_msg", "new_invalid_msg", "increased sum of invalid message"),
        gauge("call_setup", "new_call_setup", "increased sum of call setup"),
        gauge("call_end", "new_call_end", "increased sum of call end"),
        gauge("up_stream", "new_up_stream", "increased sum of up stream"),
        gauge("down_stream", "new_down_stream", "increased sum of down stream"),
    ],
};

/// Bootstrap service stats, one record per bootstrap node.
pub static BOOTSTRAP: Schema = Schema {
    name: "bootstrap",
    subsystem: "bootstrap",
    fields: &[
        skip("time"),
        label("bootstrap_id", "BootstrapId"),
        label("ip", "IP"),
        label("port", "Port"),
        gauge("query", "new_query", "increased sum of query"),
        gauge("healthy_host", "heathy_host", "sum of heathy host"),
        gauge("host", "host", "sum of host"),
        gauge("route_table_len", "route_table_len", "route table len"),
    ],
};

/// DHT service stats, one record per DHT instance.
pub static DHT: Schema = Schema {
    name: "dht",
    subsystem: "dht",
    fields: &[
        skip("time"),
        label("dht_id", "DhtId"),
        label("host_id", "HostId"),
        label("ip", "IP"),
        label("port", "Port"),
        gauge("status", "status", "connected status"),
        gauge("healthy", "heathy", "heathy or not"),
        gauge("route_table", "route_table", "sum of route table"),
        gauge("online", "online", "sum of online user"),
        gauge("offline", "offline", "sum of offline user"),
        gauge("silent", "silent", "sum of silent user"),
        gauge("connect", "connect", "sum of connect"),
        skip("host_list"),
        gauge("getvalue", "getvalue", "sum of getvalue"),
        gauge("setvalue", "setvalue", "sum of setvalue"),
        skip("getvalue_speed_list"),
    ],
};

/// SPS signaling service stats, one record per SPS instance.
pub static SPS: Schema = Schema {
    name: "sps",
    subsystem: "sps",
    fields: &[
        skip("time"),
        label("sps_id", "SpsId"),
        label("host_id", "HostId"),
        label("ip", "IP"),
        label("port", "Port"),
        gauge("connect", "connect", "connected link"),
        gauge("send_msg", "new_send_msg", "sum of send message"),
        gauge("send_host_msg", "new_send_host_msg", "sum of send host message"),
        gauge("send_client_msg", "new_send_client_msg", "sum of send client message"),
        gauge("send_silent_msg", "new_send_silent_msg", "sum of send silent message"),
        gauge(
            "send_silent_msg_ok",
            "new_send_host_msg_ok",
            "sum of send host message successed",
        ),
    ],
};

/// APNS push service stats, one record per push-service instance.
pub static APNS: Schema = Schema {
    name: "apns",
    subsystem: "apns",
    fields: &[
        skip("time"),
        label("apns_id", "ApnsId"),
        label("host_id", "HostId"),
        label("ip", "IP"),
        label("port", "Port"),
        gauge("connect", "connect", "connected link"),
        gauge("task", "task", "sum of task"),
        gauge("pushed", "new_pushed", "sum of pushed msg"),
        gauge("push_ok", "new_push_succed", "sum of pushed msg succed"),
        gauge("push_failed", "new_push_failed", "sum of pushed msg failed"),
    ],
};

/// Call-manager service stats, one record per call-manager instance.
pub static CALLMGR: Schema = Schema {
    name: "callmgr",
    subsystem: "cm",
    fields: &[
        skip("time"),
        label("cm_id", "CmId"),
        label("host_id", "HostId"),
        label("ip", "IP"),
        label("port", "Port"),
        gauge("onphone", "onphone", "sum of onphone"),
        gauge("onphone_video", "new_onphone_video", "increased sum of onphone video"),
        gauge("onphone_audio", "new_onphone_audio", "increased sum of onphone audio"),
        gauge("released", "new_released", "increased sum of released"),
        gauge("broken", "new_broken", "increased sum of broken call"),
        gauge("block_by_sys", "new_block_by_sys", "increased sum of call block by system"),
        gauge("block_by_man", "new_block_by_man", "increased sum of call block by man"),
        gauge(
            "block_called_offline",
            "new_block_called_offline",
            "increased sum of call block by called offline",
        ),
    ],
};

/// Every registered schema, in a stable order.
pub static SCHEMAS: [&Schema; 10] = [
    &SERVER_SUMMARY,
    &USER_STATISTIC,
    &CALL_STATISTIC,
    &HOST,
    &RELAY,
    &BOOTSTRAP,
    &DHT,
    &SPS,
    &APNS,
    &CALLMGR,
];

/// Pure lookup over the registered schemas.
pub struct SchemaTable;

impl SchemaTable {
    /// Look up a schema by its configuration name.
    ///
    /// # Errors
    /// Returns [`UnknownSourceKind`] if no schema is registered under `name`.
    pub fn get(name: &str) -> Result<&'static Schema, UnknownSourceKind> {
        SCHEMAS
            .iter()
            .find(|s| s.name == name)
            .copied()
            .ok_or_else(|| UnknownSourceKind(name.to_string()))
    }

    /// All registered schemas.
    pub fn all() -> &'static [&'static Schema] {
        &SCHEMAS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_kinds() {
        for s in SchemaTable::all() {
            assert!(std::ptr::eq(SchemaTable::get(s.name).unwrap(), *s));
        }
    }

    #[test]
    fn test_lookup_unknown_kind() {
        let err = SchemaTable::get("acd").unwrap_err();
        assert!(err.to_string().contains("unknown source kind"));
    }

    #[test]
    fn test_field_counts_match_feed_documentation() {
        let expected = [
            ("server_summary", 8),
            ("user_statistic", 7),
            ("call_statistic", 8),
            ("host", 26),
            ("relay", 14),
            ("bootstrap", 8),
            ("dht", 16),
            ("sps", 11),
            ("apns", 10),
            ("callmgr", 13),
        ];
        for (name, count) in expected {
            assert_eq!(SchemaTable::get(name).unwrap().fields.len(), count, "{name}");
        }
    }

    #[test]
    fn test_relay_labels_in_field_order() {
        assert_eq!(RELAY.label_names(), vec!["RelayId", "IP", "Port"]);
        assert_eq!(RELAY.field_index("ip"), Some(2));
        assert_eq!(RELAY.field_index("relay_id"), Some(1));
    }

    #[test]
    fn test_unlabeled_schema_has_no_label_columns() {
        assert!(USER_STATISTIC.label_names().is_empty());
        assert_eq!(USER_STATISTIC.value_fields().count(), 5);
    }

    #[test]
    fn test_value_fields_are_numeric() {
        for s in SchemaTable::all() {
            for (_, f) in s.value_fields() {
                assert!(
                    matches!(f.kind, FieldKind::Int | FieldKind::Float),
                    "{}.{} exports a non-numeric kind",
                    s.name,
                    f.name
                );
            }
        }
    }
}

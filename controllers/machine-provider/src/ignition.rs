//! Ignition builder
//!
//! Renders the first-boot ignition document for a machine: hostname, the
//! user-data init script, DNS resolver configuration and the merged
//! metadata, plus the oneshot unit running the script. The builder is pure;
//! identical inputs produce identical bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Value};
use thiserror::Error;

const IGNITION_VERSION: &str = "3.2.0";
const METADATA_PATH: &str = "/var/lib/metal-cloud-config/metadata";
const INIT_SCRIPT_PATH: &str = "/var/lib/metal-cloud-config/init.sh";
const DNS_CONF_PATH: &str = "/etc/systemd/resolved.conf.d/dns.conf";

const INIT_UNIT_NAME: &str = "cloud-config-init.service";
const INIT_UNIT: &str = "[Unit]
Wants=network-online.target
After=network-online.target
ConditionPathExists=!/var/lib/metal-cloud-config/init.done

[Service]
Type=oneshot
ExecStart=/var/lib/metal-cloud-config/init.sh
ExecStopPost=touch /var/lib/metal-cloud-config/init.done
Restart=on-failure
RestartSec=5

[Install]
WantedBy=multi-user.target
";

/// Inputs of one ignition rendering.
pub struct Config<'a> {
    pub hostname: &'a str,
    pub user_data: &'a str,
    pub metadata: &'a Map<String, Value>,
    /// Raw ignition fragment (YAML); empty when the machine class carries none.
    pub ignition: &'a str,
    pub dns_servers: &'a [String],
    pub ignition_override: bool,
}

#[derive(Debug, Error)]
pub enum IgnitionError {
    #[error("failed to parse raw ignition fragment: {0}")]
    Fragment(#[from] serde_yaml::Error),
    #[error("failed to encode ignition document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Renders the ignition document as JSON bytes.
pub fn render(config: &Config<'_>) -> Result<Vec<u8>, IgnitionError> {
    let fragment = if config.ignition.is_empty() {
        None
    } else {
        Some(serde_yaml::from_str::<Value>(config.ignition)?)
    };

    let document = match (config.ignition_override, fragment) {
        (true, Some(fragment)) => fragment,
        (false, Some(fragment)) => {
            let mut document = template(config)?;
            merge_fragment(&mut document, fragment);
            document
        }
        (_, None) => template(config)?,
    };

    Ok(serde_json::to_vec(&document)?)
}

fn template(config: &Config<'_>) -> Result<Value, IgnitionError> {
    let mut files = vec![
        json!({
            "overwrite": true,
            "path": "/etc/hostname",
            "contents": {
                "compression": "",
                "source": plain_data_url(&format!("{}\n", config.hostname)),
            },
            "mode": 420,
        }),
        json!({
            "overwrite": true,
            "path": INIT_SCRIPT_PATH,
            "contents": {
                "compression": "",
                "source": plain_data_url(&format!("{}\n", config.user_data)),
            },
            "mode": 493,
        }),
    ];

    if !config.dns_servers.is_empty() {
        let resolved = format!(
            "[Resolve]\n{}",
            config
                .dns_servers
                .iter()
                .map(|server| format!("DNS={server}"))
                .collect::<Vec<_>>()
                .join("\n")
        );
        files.push(json!({
            "path": DNS_CONF_PATH,
            "contents": {
                "compression": "",
                "source": plain_data_url(&resolved),
            },
            "mode": 420,
        }));
    }

    if !config.metadata.is_empty() {
        let encoded = serde_json::to_vec(config.metadata)?;
        files.push(json!({
            "path": METADATA_PATH,
            "contents": {
                "compression": "",
                "source": format!("data:;base64,{}", BASE64.encode(encoded)),
            },
            "mode": 420,
        }));
    }

    Ok(json!({
        "ignition": {"version": IGNITION_VERSION},
        "storage": {"files": files},
        "systemd": {
            "units": [{
                "contents": INIT_UNIT,
                "enabled": true,
                "name": INIT_UNIT_NAME,
            }],
        },
    }))
}

/// Merges the raw fragment into the document: maps merge recursively,
/// everything else is replaced by the fragment's value.
fn merge_fragment(document: &mut Value, fragment: Value) {
    match fragment {
        Value::Object(overlay) if document.is_object() => {
            let base = document.as_object_mut().unwrap();
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_fragment(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        other => *document = other,
    }
}

// `data:,` URL with percent encoding; only RFC 3986 unreserved characters
// stay literal.
fn plain_data_url(content: &str) -> String {
    use std::fmt::Write;

    let mut url = String::with_capacity(content.len() + 6);
    url.push_str("data:,");
    for byte in content.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                url.push(byte as char);
            }
            other => {
                let _ = write!(url, "%{other:02X}");
            }
        }
    }
    url
}

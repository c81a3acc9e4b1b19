//! Atomic, human-readable persistence of registry metadata and global
//! settings.
//!
//! The document has three sections (`global_transcode`, `global_streaming`,
//! `channels`); any key beginning with `_` is a comment and ignored on load.
//! The loader also accepts the older flat format (top-level `global_bitrate`,
//! `selected_nic`, `media_path`) so existing documents can be upgraded in
//! place. Writes are atomic: a temp file in the same directory is written
//! and renamed into place, so a crash mid-write cannot corrupt the existing
//! document.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::state::TranscodeProfile;

/// Per-channel metadata as persisted to disk: everything in the channel data
/// model except the transient `running` and `thumb` fields, which are
/// recomputed rather than stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelRecord {
    pub src_path: String,
    pub filepath: String,
    pub filename: String,
    pub ip: String,
    pub port: u16,
    pub encap: String,
    #[serde(rename = "loop")]
    pub loop_playback: bool,
    pub bitrate: String,
    pub codec: String,
    pub preset: String,
    pub vbitrate: String,
    pub abitrate: String,
    pub resolution: String,
    pub fps: String,
    pub pre_transcoded: bool,
}

impl Default for ChannelRecord {
    fn default() -> Self {
        Self {
            src_path: String::new(),
            filepath: String::new(),
            filename: String::new(),
            ip: String::new(),
            port: 0,
            encap: "udp".to_string(),
            loop_playback: true,
            bitrate: String::new(),
            codec: "copy".to_string(),
            preset: "fast".to_string(),
            vbitrate: String::new(),
            abitrate: String::new(),
            resolution: "original".to_string(),
            fps: "original".to_string(),
            pre_transcoded: false,
        }
    }
}

/// `global_streaming` section: everything about channel defaults that isn't
/// the transcode profile.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalStreamingSettings {
    pub global_bitrate: String,
    pub selected_nic: String,
    pub monitor_nic: String,
    pub media_path: String,
    pub auto_start: bool,
}

/// Result of loading the state document: global settings plus every
/// persisted channel, keyed by `cid`. Recovery discipline (skipping
/// channels whose prepared artifact no longer resolves) is the registry's
/// responsibility, not the store's — this type carries everything on disk
/// verbatim.
#[derive(Debug, Clone, Default)]
pub struct LoadedState {
    pub global_transcode: Option<TranscodeProfile>,
    pub global_streaming: Option<GlobalStreamingSettings>,
    pub channels: BTreeMap<usize, ChannelRecord>,
}

/// Loads the state document at `path`.
///
/// Returns `LoadedState::default()` (nothing set) if the file doesn't exist
/// or fails to parse; a parse failure is logged but never fatal — the
/// in-memory registry simply starts empty, matching the recovery policy
/// for a corrupt state file.
pub fn load(path: &Path) -> LoadedState {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return LoadedState::default(),
    };

    let doc: Value = match serde_json::from_str(&contents) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("[StateStore] Failed to parse state file {:?}: {e}", path);
            return LoadedState::default();
        }
    };

    let global_transcode = doc
        .get("global_transcode")
        .and_then(|v| serde_json::from_value(v.clone()).ok());

    // Sectioned format, falling back to the legacy flat format for each field.
    let global_streaming = {
        let sectioned = doc.get("global_streaming");
        let bitrate = sectioned
            .and_then(|s| s.get("global_bitrate"))
            .or_else(|| doc.get("global_bitrate"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let selected_nic = sectioned
            .and_then(|s| s.get("selected_nic"))
            .or_else(|| doc.get("selected_nic"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let monitor_nic = sectioned
            .and_then(|s| s.get("monitor_nic"))
            .or_else(|| doc.get("monitor_nic"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let media_path = sectioned
            .and_then(|s| s.get("media_path"))
            .or_else(|| doc.get("media_path"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let auto_start = sectioned
            .and_then(|s| s.get("auto_start"))
            .or_else(|| doc.get("auto_start"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if sectioned.is_none()
            && doc.get("global_bitrate").is_none()
            && doc.get("selected_nic").is_none()
            && doc.get("media_path").is_none()
        {
            None
        } else {
            Some(GlobalStreamingSettings {
                global_bitrate: bitrate,
                selected_nic,
                monitor_nic,
                media_path,
                auto_start,
            })
        }
    };

    let mut channels = BTreeMap::new();
    if let Some(Value::Object(map)) = doc.get("channels") {
        for (cid_str, value) in map {
            if cid_str.starts_with('_') {
                continue;
            }
            let Ok(cid) = cid_str.parse::<usize>() else {
                continue;
            };
            if let Ok(record) = serde_json::from_value::<ChannelRecord>(value.clone()) {
                channels.insert(cid, record);
            }
        }
    }

    LoadedState {
        global_transcode,
        global_streaming,
        channels,
    }
}

/// Saves the state document atomically: writes to a temp file in the same
/// directory, then renames it into place.
///
/// I/O failures are the caller's to log; this function only reports them so
/// the in-memory state can remain authoritative regardless of outcome.
pub fn save(
    path: &Path,
    global_transcode: &TranscodeProfile,
    global_streaming: &GlobalStreamingSettings,
    channels: &BTreeMap<usize, ChannelRecord>,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let channels_obj: serde_json::Map<String, Value> = channels
        .iter()
        .map(|(cid, record)| (cid.to_string(), serde_json::to_value(record).unwrap()))
        .collect();

    let doc = json!({
        "_readme": "ChannelCast state file. Do not edit while the server is running.",
        "global_transcode": {
            "_readme": "Default transcode profile applied to new uploads.",
            "codec": global_transcode.codec,
            "preset": global_transcode.preset,
            "vbitrate": global_transcode.vbitrate,
            "abitrate": global_transcode.abitrate,
            "resolution": global_transcode.resolution,
            "fps": global_transcode.fps,
        },
        "global_streaming": {
            "_readme": "Global streaming defaults.",
            "global_bitrate": global_streaming.global_bitrate,
            "selected_nic": global_streaming.selected_nic,
            "monitor_nic": global_streaming.monitor_nic,
            "media_path": global_streaming.media_path,
            "auto_start": global_streaming.auto_start,
        },
        "channels": channels_obj,
    });

    let contents = serde_json::to_string_pretty(&doc)?;
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, contents)?;
    std::fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record() -> ChannelRecord {
        ChannelRecord {
            src_path: "/media/originals/clip.mp4".to_string(),
            filepath: "/media/originals/clip.mp4".to_string(),
            filename: "clip.mp4".to_string(),
            ip: "239.252.100.1".to_string(),
            port: 1234,
            encap: "udp".to_string(),
            loop_playback: true,
            bitrate: String::new(),
            codec: "copy".to_string(),
            preset: "fast".to_string(),
            vbitrate: String::new(),
            abitrate: String::new(),
            resolution: "original".to_string(),
            fps: "original".to_string(),
            pre_transcoded: true,
        }
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let loaded = load(&path);
        assert!(loaded.channels.is_empty());
        assert!(loaded.global_transcode.is_none());
    }

    #[test]
    fn save_then_load_round_trips_channels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut channels = BTreeMap::new();
        channels.insert(0, sample_record());

        let transcode = TranscodeProfile::default();
        let streaming = GlobalStreamingSettings {
            global_bitrate: "8M".to_string(),
            selected_nic: "eth0".to_string(),
            monitor_nic: "eth0".to_string(),
            media_path: "/media".to_string(),
            auto_start: true,
        };

        save(&path, &transcode, &streaming, &channels).unwrap();
        let loaded = load(&path);

        assert_eq!(loaded.channels.get(&0), channels.get(&0));
        assert_eq!(loaded.global_transcode.unwrap(), transcode);
        assert_eq!(loaded.global_streaming.unwrap().selected_nic, "eth0");
    }

    #[test]
    fn load_accepts_legacy_flat_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let flat = json!({
            "global_bitrate": "6M",
            "selected_nic": "eth1",
            "media_path": "/old/media",
            "channels": {
                "2": sample_record(),
            }
        });
        std::fs::write(&path, serde_json::to_string(&flat).unwrap()).unwrap();

        let loaded = load(&path);
        let streaming = loaded.global_streaming.unwrap();
        assert_eq!(streaming.global_bitrate, "6M");
        assert_eq!(streaming.selected_nic, "eth1");
        assert!(loaded.channels.contains_key(&2));
    }

    #[test]
    fn load_ignores_underscore_prefixed_channel_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let doc = json!({
            "channels": {
                "_readme": "comment",
                "0": sample_record(),
            }
        });
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let loaded = load(&path);
        assert_eq!(loaded.channels.len(), 1);
        assert!(loaded.channels.contains_key(&0));
    }

    #[test]
    fn load_corrupt_file_is_non_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not valid json").unwrap();

        let loaded = load(&path);
        assert!(loaded.channels.is_empty());
    }
}

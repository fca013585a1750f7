/**
 * Payload serialization: plain JSON for the store endpoint, envelopes for
 * the envelope endpoint.
 *
 * Envelope layout (each line terminated by `\n`):
 *
 * ```text
 * {"event_id":"…","sent_at":"…","dsn":"…","sdk":{…}}
 * {"type":"event|transaction|check_in","content_type":"application/json","length":N}
 * <item payload, N bytes>
 * ```
 */
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use super::dsn::Dsn;
use super::types::{Event, EventKind, SdkInfo};

/**
 * Turns events into request bodies.
 *
 * The format follows the same predicate as endpoint selection, so a
 * payload always matches the endpoint it is posted to.
 */
#[derive(Debug, Clone)]
pub struct PayloadSerializer {
    dsn: Option<Dsn>,
    tracing_enabled: bool,
}

impl PayloadSerializer {
    pub fn new(dsn: Option<Dsn>, tracing_enabled: bool) -> Self {
        Self {
            dsn,
            tracing_enabled,
        }
    }

    /// True when events of `kind` go to the envelope endpoint.
    pub fn uses_envelope(&self, kind: EventKind) -> bool {
        uses_envelope(self.tracing_enabled, kind)
    }

    pub fn serialize(&self, event: &Event) -> Result<Vec<u8>, serde_json::Error> {
        if self.uses_envelope(event.kind) {
            self.serialize_envelope(event)
        } else {
            serde_json::to_vec(event)
        }
    }

    fn serialize_envelope(&self, event: &Event) -> Result<Vec<u8>, serde_json::Error> {
        let payload = match (event.kind, &event.check_in) {
            (EventKind::CheckIn, Some(check_in)) => serde_json::to_vec(check_in)?,
            _ => serde_json::to_vec(event)?,
        };

        let mut header = json!({
            "event_id": event.event_id.simple().to_string(),
            "sent_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "sdk": SdkInfo::default(),
        });
        if let Some(dsn) = &self.dsn {
            header["dsn"] = json!(dsn.to_string());
        }

        let item_header = json!({
            "type": event.kind.item_type(),
            "content_type": "application/json",
            "length": payload.len(),
        });

        let mut body = serde_json::to_vec(&header)?;
        body.push(b'\n');
        body.extend(serde_json::to_vec(&item_header)?);
        body.push(b'\n');
        body.extend(payload);
        body.push(b'\n');
        Ok(body)
    }
}

/// Envelope endpoint iff tracing is on or the event is a transaction/check-in.
pub fn uses_envelope(tracing_enabled: bool, kind: EventKind) -> bool {
    tracing_enabled || matches!(kind, EventKind::Transaction | EventKind::CheckIn)
}

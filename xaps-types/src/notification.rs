//! Push notification and its binary frame encoding.
//!
//! The gateway speaks the "enhanced" binary framing: a frame is a command
//! byte `2` plus a 32-bit big-endian length, followed by typed items. Each
//! item is an id byte, a 16-bit big-endian length and the item payload.

use serde_json::json;

use crate::EncodeError;

/// Frame command byte for the enhanced notification format.
pub const FRAME_COMMAND: u8 = 2;

/// Raw length of a device token in bytes.
pub const DEVICE_TOKEN_LEN: usize = 32;

/// Item id carrying the raw device token.
const ITEM_DEVICE_TOKEN: u8 = 1;

/// Item id carrying the JSON payload.
const ITEM_PAYLOAD: u8 = 2;

/// Item id carrying the notification priority.
const ITEM_PRIORITY: u8 = 5;

/// One push notification, immutable once created.
///
/// The device token is carried as hex text at the protocol boundary and
/// decoded to raw bytes only at encode time. Encoding validates it then;
/// construction does not.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Device token as 64 hex characters.
    pub device_token: String,
    /// JSON payload; must contain an `aps` key per the gateway contract.
    pub payload: serde_json::Value,
    /// Optional delivery priority byte.
    pub priority: Option<u8>,
}

impl Notification {
    /// Create a notification with an arbitrary payload.
    pub fn new(device_token: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            device_token: device_token.into(),
            payload,
            priority: None,
        }
    }

    /// Create the new-mail notification for a registered account.
    ///
    /// This is the only payload the daemon produces:
    /// `{"aps": {"account-id": <account_id>}}`.
    pub fn new_mail(device_token: impl Into<String>, account_id: &str) -> Self {
        Self::new(device_token, json!({ "aps": { "account-id": account_id } }))
    }

    /// Set the priority byte.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Encode this notification as one wire frame.
    ///
    /// Items are emitted in fixed order: device token, payload, then the
    /// priority item only when a priority was supplied. A token that is not
    /// valid hex or not exactly 32 raw bytes fails with no partial output.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let token = hex::decode(&self.device_token)?;
        if token.len() != DEVICE_TOKEN_LEN {
            return Err(EncodeError::TokenLength { len: token.len() });
        }

        // serde_json emits the compact form (no whitespace between tokens).
        let payload = serde_json::to_vec(&self.payload)?;

        let mut items = Vec::with_capacity(3 + DEVICE_TOKEN_LEN + payload.len() + 6);
        push_item(&mut items, ITEM_DEVICE_TOKEN, &token)?;
        push_item(&mut items, ITEM_PAYLOAD, &payload)?;
        if let Some(priority) = self.priority {
            push_item(&mut items, ITEM_PRIORITY, &[priority])?;
        }

        let mut frame = Vec::with_capacity(5 + items.len());
        frame.push(FRAME_COMMAND);
        frame.extend_from_slice(&(items.len() as u32).to_be_bytes());
        frame.extend_from_slice(&items);
        Ok(frame)
    }
}

/// Append one `id + u16 length + payload` item.
fn push_item(out: &mut Vec<u8>, id: u8, payload: &[u8]) -> Result<(), EncodeError> {
    let len = u16::try_from(payload.len())
        .map_err(|_| EncodeError::ItemTooLarge { len: payload.len() })?;
    out.push(id);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "361E1CF19D03E6A3380AB34B83399F1123FF523F9AC7AB2F3ADA531DDD9A96C1";

    /// Split a frame back into `(id, payload)` items.
    fn decode_items(frame: &[u8]) -> Vec<(u8, Vec<u8>)> {
        assert_eq!(frame[0], FRAME_COMMAND);
        let total = u32::from_be_bytes(frame[1..5].try_into().unwrap()) as usize;
        let mut rest = &frame[5..];
        assert_eq!(rest.len(), total);

        let mut items = Vec::new();
        while !rest.is_empty() {
            let id = rest[0];
            let len = u16::from_be_bytes(rest[1..3].try_into().unwrap()) as usize;
            items.push((id, rest[3..3 + len].to_vec()));
            rest = &rest[3 + len..];
        }
        items
    }

    #[test]
    fn frame_round_trips_token_and_payload() {
        let notification = Notification::new_mail(TOKEN, "1B737D45-5B98-48B0-BD2F-571343D03F85");
        let frame = notification.encode().unwrap();

        let items = decode_items(&frame);
        assert_eq!(items.len(), 2);

        let (id, token) = &items[0];
        assert_eq!(*id, 1);
        assert_eq!(token, &hex::decode(TOKEN).unwrap());

        let (id, payload) = &items[1];
        assert_eq!(*id, 2);
        let value: serde_json::Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "aps": { "account-id": "1B737D45-5B98-48B0-BD2F-571343D03F85" } })
        );
    }

    #[test]
    fn total_length_covers_all_items() {
        let frame = Notification::new_mail(TOKEN, "A1").encode().unwrap();
        let total = u32::from_be_bytes(frame[1..5].try_into().unwrap()) as usize;
        assert_eq!(frame.len(), 5 + total);

        // Two items: 3-byte header + 32-byte token, 3-byte header + JSON.
        let json_len = serde_json::to_vec(&serde_json::json!({ "aps": { "account-id": "A1" } }))
            .unwrap()
            .len();
        assert_eq!(total, (3 + 32) + (3 + json_len));
    }

    #[test]
    fn payload_is_compact_json() {
        let frame = Notification::new_mail(TOKEN, "A1").encode().unwrap();
        let items = decode_items(&frame);
        let payload = String::from_utf8(items[1].1.clone()).unwrap();
        assert!(!payload.contains(' '), "payload must have no whitespace: {payload}");
    }

    #[test]
    fn priority_item_is_emitted_last() {
        let frame = Notification::new_mail(TOKEN, "A1")
            .with_priority(10)
            .encode()
            .unwrap();
        let items = decode_items(&frame);
        assert_eq!(items.len(), 3);
        assert_eq!(items[2], (5, vec![10]));
    }

    #[test]
    fn priority_absent_when_not_supplied() {
        let frame = Notification::new_mail(TOKEN, "A1").encode().unwrap();
        let items = decode_items(&frame);
        assert!(items.iter().all(|(id, _)| *id != 5));
    }

    #[test]
    fn short_token_is_rejected() {
        // 63 hex chars cannot decode to 32 bytes.
        let notification = Notification::new_mail(&TOKEN[..63], "A1");
        assert!(matches!(
            notification.encode(),
            Err(EncodeError::TokenNotHex(_))
        ));

        // 62 chars decode cleanly but to 31 bytes.
        let notification = Notification::new_mail(&TOKEN[..62], "A1");
        assert!(matches!(
            notification.encode(),
            Err(EncodeError::TokenLength { len: 31 })
        ));
    }

    #[test]
    fn non_hex_token_is_rejected() {
        let bad = format!("ZZ{}", &TOKEN[2..]);
        let notification = Notification::new_mail(bad, "A1");
        assert!(matches!(
            notification.encode(),
            Err(EncodeError::TokenNotHex(_))
        ));
    }
}

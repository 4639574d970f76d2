//! Correlation references and stamps

use crate::host::OrderId;
use chrono::Utc;

/// Length of a reference in hex characters
pub const REFERENCE_LEN: usize = 40;

/// Fresh 40-hex-character random reference.
///
/// Used for payment references and refund unique ids alike.
pub fn generate_reference() -> String {
    let bytes: [u8; REFERENCE_LEN / 2] = rand::random();
    hex::encode(bytes)
}

/// Payment stamp `<shop instance>-<order id>-<unix time>`
pub fn payment_stamp(shop_instance: &str, order_id: OrderId) -> String {
    format!("{}-{}-{}", shop_instance, order_id, Utc::now().timestamp())
}

/// Whether `value` looks like a reference this module generated
pub fn is_reference(value: &str) -> bool {
    value.len() == REFERENCE_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_shape() {
        let reference = generate_reference();
        assert_eq!(reference.len(), 40);
        assert!(is_reference(&reference));
        assert_ne!(reference, generate_reference());
    }

    #[test]
    fn test_stamp() {
        let stamp = payment_stamp("2", 17);
        assert!(stamp.starts_with("2-17-"));
    }

    #[test]
    fn test_is_reference() {
        assert!(!is_reference("abc"));
        assert!(!is_reference(&"z".repeat(40)));
    }
}

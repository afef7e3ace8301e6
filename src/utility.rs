//! Utility functions useful throughout the codebase.

use uuid::Uuid;

/// Formats a UUID as its first 8 hex digits, rather than the full thing.
/// This allows for more-compact printing.
#[must_use]
pub fn clip_uuid(uuid: &Uuid) -> String {
    let string = format!("{uuid}");
    string[0..8].to_string()
}

#[cfg(test)]
mod test {
    use uuid::Uuid;

    use crate::utility::clip_uuid;

    #[test]
    fn clips_to_the_first_group() {
        let uuid = Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0);
        assert_eq!(clip_uuid(&uuid), "12345678");
    }
}

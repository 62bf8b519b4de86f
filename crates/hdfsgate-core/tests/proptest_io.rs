//! Property-based tests for the write/read and append laws.

mod common;

use common::{bound_service, write};
use proptest::prelude::*;

fn any_data() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..4096)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever is written is read back unchanged.
    #[test]
    fn test_write_then_read(data in any_data()) {
        let read = runtime().block_on(async {
            let (_fs, service) = bound_service().await;
            write(&service, "/p", "f", &data, false).await;
            service.read_all_bytes("/p/f").await.unwrap()
        });
        prop_assert_eq!(read, data);
    }

    /// Appending concatenates.
    #[test]
    fn test_append_concatenates(first in any_data(), second in any_data()) {
        let read = runtime().block_on(async {
            let (_fs, service) = bound_service().await;
            write(&service, "/p", "f", &first, false).await;
            write(&service, "/p", "f", &second, true).await;
            service.read_all_bytes("/p/f").await.unwrap()
        });
        let mut expected = first.clone();
        expected.extend_from_slice(&second);
        prop_assert_eq!(read, expected);
    }

    /// A non-append write replaces prior content.
    #[test]
    fn test_overwrite_replaces(old in any_data(), new in any_data()) {
        let read = runtime().block_on(async {
            let (_fs, service) = bound_service().await;
            write(&service, "/p", "f", &old, false).await;
            write(&service, "/p", "f", &new, false).await;
            service.read_all_bytes("/p/f").await.unwrap()
        });
        prop_assert_eq!(read, new);
    }

    /// Extended attribute values survive a round trip.
    #[test]
    fn test_xattr_value_round_trip(value in proptest::collection::vec(any::<u8>(), 0..256)) {
        let read = runtime().block_on(async {
            let (_fs, service) = bound_service().await;
            write(&service, "/p", "f", b"", false).await;
            service.set_extended_attributes("/p/f", "user.blob", &value).await.unwrap();
            service.get_extended_attribute("/p/f", "user.blob").await.unwrap()
        });
        prop_assert_eq!(read, Some(value));
    }
}

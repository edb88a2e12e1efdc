#[cfg(test)]
mod field_store_tests {
    use std::collections::HashMap;
    use tempfile::TempDir;

    use crate::errors::FieldStoreError;
    use crate::field_store::*;
    use crate::tests::test_helpers::test_helpers::*;

    fn input(dir: &TempDir) -> std::path::PathBuf {
        write_snapshot(
            dir.path(),
            "pov_in.json",
            vec![
                message("ALNUtune", 20240229, 23, vec![1.0, 0.0, 1.2, 0.1 + 0.2]),
                message("ALNUsaisn", 20240229, 23, vec![0.0, 3.0, 4.0, 5.0]),
                message("FR_LAND", 20240229, 23, vec![1.0, 1.0, 0.5, 1e-300]),
            ],
        )
    }

    #[test]
    fn test_write_replaces_only_updated_fields() {
        let dir = TempDir::new().unwrap();
        let path_in = input(&dir);
        let path_out = dir.path().join("pov_out.json");

        let mut updated = HashMap::new();
        updated.insert("ALNUtune".to_string(), vec![2.0, 2.0, 2.0, 2.0]);
        JsonFieldStore::new()
            .write_all_fields(&path_in, &path_out, &updated, 1)
            .unwrap();

        let before = read_snapshot(&path_in);
        let after = read_snapshot(&path_out);
        assert_eq!(after.messages.len(), 3);

        let tune = after.get("ALNUtune").unwrap();
        assert_eq!(tune.values, vec![2.0, 0.0, 2.0, 2.0]);

        for name in ["ALNUsaisn", "FR_LAND"] {
            let old = before.get(name).unwrap();
            let new = after.get(name).unwrap();
            assert_eq!(new.values, old.values);
            assert_eq!(new.values[3].to_bits(), old.values[3].to_bits());
        }

        // 2024 is a leap year.
        for m in &after.messages {
            assert_eq!((m.data_date, m.hour), (20240301, 0));
        }
    }

    #[test]
    fn test_zero_increment_keeps_time() {
        let dir = TempDir::new().unwrap();
        let path_in = input(&dir);
        let path_out = dir.path().join("pov_out.json");
        JsonFieldStore::new()
            .write_all_fields(&path_in, &path_out, &HashMap::new(), 0)
            .unwrap();
        assert_eq!(read_snapshot(&path_out), read_snapshot(&path_in));
    }

    #[test]
    fn test_out_of_range_increment_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path_in = input(&dir);
        let path_out = dir.path().join("pov_out.json");
        let err = JsonFieldStore::new()
            .write_all_fields(&path_in, &path_out, &HashMap::new(), 10_000_000_000)
            .unwrap_err();
        assert!(matches!(
            err,
            FieldStoreError::TimeOverflow {
                hours: 10_000_000_000,
                ..
            }
        ));
        assert!(!path_out.exists());
        assert!(advance_time(chrono::NaiveDateTime::MAX, i64::MAX).is_none());
    }

    #[test]
    fn test_unknown_update_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path_in = input(&dir);
        let path_out = dir.path().join("pov_out.json");

        let mut updated = HashMap::new();
        updated.insert("BETUtune".to_string(), vec![1.0; 4]);
        let err = JsonFieldStore::new()
            .write_all_fields(&path_in, &path_out, &updated, 1)
            .unwrap_err();
        assert!(matches!(err, FieldStoreError::MissingField { .. }));
        assert!(!path_out.exists());
    }

    #[test]
    fn test_size_mismatch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path_in = input(&dir);
        let path_out = dir.path().join("pov_out.json");

        let mut updated = HashMap::new();
        updated.insert("ALNUtune".to_string(), vec![1.0; 3]);
        let err = JsonFieldStore::new()
            .write_all_fields(&path_in, &path_out, &updated, 1)
            .unwrap_err();
        assert!(matches!(
            err,
            FieldStoreError::GridSizeMismatch {
                expected: 4,
                found: 3,
                ..
            }
        ));
        assert!(!path_out.exists());
    }

    #[test]
    fn test_read_rejects_malformed_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "bad.json", "{\"messages\": [{\"short_name\": 3}]}");
        let err = JsonFieldStore::new().read_all_fields(&path).unwrap_err();
        assert!(matches!(err, FieldStoreError::JsonParseError { .. }));

        let err = JsonFieldStore::new()
            .read_all_fields(&dir.path().join("absent.json"))
            .unwrap_err();
        assert!(matches!(err, FieldStoreError::IoError { .. }));
    }

    #[test]
    fn test_field_set_lookup() {
        let dir = TempDir::new().unwrap();
        let fields = JsonFieldStore::new().read_all_fields(&input(&dir)).unwrap();
        assert_eq!(
            fields.names().collect::<Vec<_>>(),
            vec!["ALNUtune", "ALNUsaisn", "FR_LAND"]
        );
        assert!(fields.require("CLON", dir.path()).is_err());
        assert_eq!(fields.require("FR_LAND", dir.path()).unwrap().values.len(), 4);
    }
}

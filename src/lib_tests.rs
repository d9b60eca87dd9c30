use super::*;

#[test]
fn cancel_token_is_shared_between_clones() {
    let token = CancelToken::new();
    let clone = token.clone();
    assert!(!clone.is_cancelled());

    token.cancel();
    assert!(clone.is_cancelled());

    token.reset();
    assert!(!clone.is_cancelled());
}

#[test]
fn setup_error_clone_preserves_io_kind_and_message() {
    let original = SetupError::IoError(std::io::Error::new(
        std::io::ErrorKind::DirectoryNotEmpty,
        "rmdir failed",
    ));
    let cloned = original.clone();

    match (&original, &cloned) {
        (SetupError::IoError(a), SetupError::IoError(b)) => {
            assert_eq!(a.kind(), b.kind());
            assert_eq!(a.to_string(), b.to_string());
        }
        _ => panic!("clone changed the variant"),
    }
}

#[test]
fn setup_error_display_names_the_failure() {
    let err = SetupError::InstallFailed("ENOTEMPTY".into());
    assert!(err.to_string().contains("Module install failed"));

    let err = SetupError::StoreOpen("no such table".into());
    assert!(err.to_string().contains("Store open failed"));
}

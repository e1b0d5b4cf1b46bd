//! Out-of-process loader failure handling
//!
//! These tests register misbehaving external loaders via the config dir and
//! live in their own test binary so the loader registry of the other tests
//! is not affected.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use opsin::*;

fn block_on<T>(future: impl std::future::Future<Output = T>) -> T {
    async_global_executor::block_on(future)
}

/// Registers the exit and stall loaders, once per test process
fn setup_loaders() {
    static SETUP: OnceLock<()> = OnceLock::new();

    SETUP.get_or_init(|| {
        let dir = std::env::temp_dir().join("opsin-test-loaders");
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(
            dir.join("exit.conf"),
            format!(
                "[loader:image/x-exit]\nExec = {}\n",
                env!("CARGO_BIN_EXE_exit-loader")
            ),
        )
        .unwrap();
        std::fs::write(
            dir.join("stall.conf"),
            format!(
                "[loader:image/x-stall]\nExec = {}\n",
                env!("CARGO_BIN_EXE_stall-loader")
            ),
        )
        .unwrap();

        std::env::set_var(LOADERS_DIR_ENV, &dir);
    });
}

fn load_with(mime_type: &str, timeout: Option<Duration>) -> Image {
    setup_loaders();

    let mut loader = Loader::new_for_bytes(vec![0; 16]);
    loader.force_mime_type(mime_type);
    loader.timeout(timeout);
    block_on(loader.load()).unwrap()
}

#[test]
fn external_loader_is_spawned() {
    let image = load_with("image/x-exit", None);

    assert_eq!(
        image.active_sandbox_mechanism(),
        SandboxMechanism::OutOfProcess
    );
    assert_eq!(image.info().width, 2);
}

#[test]
fn loader_exit_poisons_image() {
    let image = load_with("image/x-exit", None);

    let err = block_on(image.next_frame()).unwrap_err();
    assert!(
        matches!(
            err,
            Error::PrematureExit { .. } | Error::DecoderCrashed { .. }
        ),
        "Unexpected error: {err:?}"
    );

    // Every further request fails fast with the stored error
    let again = block_on(image.next_frame()).unwrap_err();
    assert_eq!(format!("{err}"), format!("{again}"));

    let third = block_on(image.specific_frame(FrameRequest::new().scale(8, 8))).unwrap_err();
    assert_eq!(format!("{err}"), format!("{third}"));
}

#[test]
fn loader_timeout_poisons_image() {
    let image = load_with("image/x-stall", Some(Duration::from_millis(250)));

    let err = block_on(image.next_frame()).unwrap_err();
    assert!(
        matches!(err, Error::Timeout { .. }),
        "Unexpected error: {err:?}"
    );

    let again = block_on(image.next_frame()).unwrap_err();
    assert!(
        matches!(again, Error::Timeout { .. }),
        "Unexpected error: {again:?}"
    );
}

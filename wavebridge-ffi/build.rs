// Build script that tries to generate a C header with `cbindgen`.
// If `cbindgen` is not available, it falls back to copying the
// checked-in `include/wavebridge.h` to $OUT_DIR.
//
// Either way, consumers can include the header from:
//   - <repo>/wavebridge-ffi/include/wavebridge.h   (checked-in)
//   - $OUT_DIR/wavebridge.h

use std::{env, fs, path::PathBuf, process::Command};

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=include/wavebridge.h");

    let (Ok(crate_dir), Ok(out_dir)) = (env::var("CARGO_MANIFEST_DIR"), env::var("OUT_DIR")) else {
        println!("cargo:warning=wavebridge-ffi: cargo did not set the manifest/out dirs; skipping header");
        return;
    };
    let crate_dir = PathBuf::from(crate_dir);
    let header_path_repo = crate_dir.join("include").join("wavebridge.h");
    let header_path_out = PathBuf::from(out_dir).join("wavebridge.h");

    let cbindgen_ok = Command::new("cbindgen")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    if cbindgen_ok {
        let generated = Command::new("cbindgen")
            .arg("--crate")
            .arg("wavebridge-ffi")
            .arg("--lang")
            .arg("C")
            .arg("--output")
            .arg(&header_path_out)
            .current_dir(&crate_dir)
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if generated {
            println!("cargo:warning=wavebridge-ffi: generated header with cbindgen -> {}", header_path_out.display());
            return;
        }
        println!("cargo:warning=wavebridge-ffi: cbindgen failed; falling back to checked-in header");
    }

    if let Err(e) = fs::copy(&header_path_repo, &header_path_out) {
        println!("cargo:warning=wavebridge-ffi: could not copy include/wavebridge.h: {e}");
    }
}

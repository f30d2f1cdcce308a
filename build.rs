use std::env;
use std::path::{Path, PathBuf};

const WATCHED_VARIABLES: [&str; 4] = ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"];

/// FFmpeg install inside a vcpkg tree, if `VCPKG_ROOT` points at one.
fn vcpkg_ffmpeg(vcpkg_root: &Path) -> Option<PathBuf> {
    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let installed = vcpkg_root.join("installed").join(triplet);
    installed
        .join("include")
        .join("libavcodec")
        .is_dir()
        .then_some(installed)
}

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // ffmpeg-sys-next finds FFmpeg through pkg-config everywhere else.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows")
        || env::var_os("FFMPEG_DIR").is_some()
    {
        return;
    }

    let Some(vcpkg_root) = env::var_os("VCPKG_ROOT").map(PathBuf::from) else {
        println!(
            "cargo:warning=birdcam needs FFmpeg. Install it with `vcpkg install ffmpeg` and set FFMPEG_DIR to the install directory."
        );
        return;
    };

    match vcpkg_ffmpeg(&vcpkg_root) {
        Some(install) => {
            println!(
                "cargo:warning=Found FFmpeg under vcpkg at {0}; set FFMPEG_DIR={0} to use it.",
                install.display()
            );
            if env::var_os("VCPKGRS_DYNAMIC").is_none() {
                println!(
                    "cargo:warning=Set VCPKGRS_DYNAMIC=1 if the vcpkg FFmpeg was built as DLLs."
                );
            }
        }
        None => println!(
            "cargo:warning=VCPKG_ROOT={} has no FFmpeg headers for this triplet.",
            vcpkg_root.display()
        ),
    }
}

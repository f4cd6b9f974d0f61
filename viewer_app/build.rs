// build.rs
// Compiles the viewer's GLSL shaders to SPIR-V with glslc

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Compile every stage file in `shader_dir` into `target_dir/<stem>.spv`
fn compile_shaders(shader_dir: &Path, target_dir: &Path, glslc: &Path) -> usize {
    let shader_files = match std::fs::read_dir(shader_dir) {
        Ok(files) => files,
        Err(_) => {
            eprintln!("info: No shader directory found at: {:?}", shader_dir);
            return 0;
        }
    };

    let mut compiled = 0;
    for entry in shader_files.flatten() {
        let path = entry.path();
        let (Some(ext), Some(stem)) = (path.extension(), path.file_stem()) else {
            continue;
        };
        if ext != "vert" && ext != "frag" {
            continue;
        }

        let out_file = target_dir.join(stem).with_extension("spv");

        // Skip sources older than their output
        let up_to_date = match (
            std::fs::metadata(&path).and_then(|m| m.modified()),
            std::fs::metadata(&out_file).and_then(|m| m.modified()),
        ) {
            (Ok(src), Ok(dst)) => src <= dst,
            _ => false,
        };
        if up_to_date {
            eprintln!("info: Shader {:?} is up to date", path.file_name().unwrap_or_default());
            continue;
        }

        let status = Command::new(glslc)
            .arg("--target-env=vulkan1.2")
            .arg(&path)
            .arg("-o")
            .arg(&out_file)
            .status();

        match status {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {:?} -> {:?}", path, out_file);
                compiled += 1;
            }
            Ok(s) => {
                panic!("glslc failed for {:?} with exit code: {}", path, s.code().unwrap_or(-1));
            }
            Err(e) => {
                panic!("Failed to run glslc for {:?}: {}", path, e);
            }
        }
    }
    compiled
}

/// glslc from `VULKAN_SDK`, else whatever is on `PATH`
fn find_glslc() -> PathBuf {
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    match env::var("VULKAN_SDK") {
        Ok(sdk) if cfg!(target_os = "windows") => PathBuf::from(sdk).join("Bin").join("glslc.exe"),
        Ok(sdk) => PathBuf::from(sdk).join("bin").join("glslc"),
        Err(_) => PathBuf::from("glslc"),
    }
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string()));
    let workspace_root = manifest_dir.parent().unwrap_or(&manifest_dir).to_path_buf();
    let shader_dir = workspace_root.join("resources").join("shaders");
    let target_dir = workspace_root.join("shaders").join("spv");

    println!("cargo:rerun-if-changed={}", shader_dir.display());
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let glslc = find_glslc();
    if Command::new(&glslc).arg("--version").output().is_err() {
        println!("cargo:warning=glslc not found, shaders not compiled; install the Vulkan SDK or set VULKAN_SDK");
        return;
    }

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        println!("cargo:warning=Failed to create {}: {}", target_dir.display(), e);
        return;
    }

    let compiled = compile_shaders(&shader_dir, &target_dir, &glslc);
    if compiled > 0 {
        eprintln!("info: Successfully compiled {} shader(s)", compiled);
    } else {
        eprintln!("info: All shaders are up to date");
    }
}

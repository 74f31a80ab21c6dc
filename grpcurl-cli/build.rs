//! Compiles the protoset fixtures consumed by the `protoset_*` integration
//! tests from their `.proto` sources under `tests/testdata/protos/`, so the
//! binary `FileDescriptorSet` testdata never has to be checked in.

use std::env;
use std::path::{Path, PathBuf};

use prost::Message;

fn compile_fixture(
    proto_dir: &Path,
    proto_file: &str,
    out_dir: &Path,
    out_name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let proto_path = proto_dir.join(proto_file);
    println!("cargo:rerun-if-changed={}", proto_path.display());

    let fds = protox::compile([&proto_path], [proto_dir])?;
    std::fs::write(out_dir.join(out_name), fds.encode_to_vec())?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let proto_dir = manifest_dir.join("tests/testdata/protos");

    compile_fixture(&proto_dir, "basic.proto", &out_dir, "test.pb")?;
    compile_fixture(&proto_dir, "full.proto", &out_dir, "test_full.pb")?;
    compile_fixture(&proto_dir, "complex.proto", &out_dir, "test_complex.pb")?;

    Ok(())
}

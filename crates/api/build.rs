//! Build script for compiling protobuf definitions into Rust code

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    println!("cargo:rerun-if-changed=proto/dpe.proto");
    tonic_build::configure()
        .bytes(["."])
        .compile(&["proto/dpe.proto"], &["proto"])?;
    Ok(())
}

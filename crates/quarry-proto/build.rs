// Build script to compile protobuf files into Rust code.
//
// Runs at compile time and generates message structs and the
// RemoteBootstrapService client/server traits from proto/.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::compile_protos("proto/remote_bootstrap.proto")?;

    Ok(())
}

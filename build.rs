fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tell Cargo to rerun if the proto files change
    println!("cargo:rerun-if-changed=proto/v1/collector.proto");

    std::fs::create_dir_all("src/proto")?;

    // Compile the proto files (protox is a pure-Rust protoc replacement,
    // avoiding the need for a system `protoc` binary)
    let fds = protox::compile(["proto/v1/collector.proto"], ["proto"])?;
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .out_dir("src/proto")
        .compile_fds(fds)?;

    Ok(())
}

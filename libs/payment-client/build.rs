fn main() {
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/payment.proto"], &["proto"])
        .unwrap_or_else(|e| panic!("Failed to compile payment.proto: {}", e));

    println!("cargo:rerun-if-changed=proto/payment.proto");
}

// Build script for idm-service
// Compiles idm_service.proto for gRPC server and client code generation
fn main() {
    println!("cargo:rerun-if-changed=../proto/services/idm_service.proto");

    // Client code is generated for the end-to-end tests
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["../proto/services/idm_service.proto"], &["../proto/services"])
        .expect("Failed to compile idm_service.proto for idm-service");
}

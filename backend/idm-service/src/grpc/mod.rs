/// gRPC server module for idm-service
///
/// Exports:
/// - IdentityServiceServer: Main gRPC server implementation
/// - idm: Generated protobuf types from idm_service.proto
pub mod server;

pub use server::idm;
pub use server::IdentityServiceServer;

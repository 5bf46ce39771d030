//! Protocol buffer types for the lumirpc resource provider protocol
//!
//! This module includes and re-exports the types generated from
//! `proto/lumirpc.proto`. The code is generated at build time by tonic_build.
//!
//! Property maps travel as `google.protobuf.Struct` (`prost_types::Struct`).
//! Update and Delete answer with `google.protobuf.Empty`, which maps to `()`.
//!
//! The gRPC service trait is re-exported as [`ResourceProviderService`] so it
//! does not clash with [`crate::ResourceProvider`].

// The file name is based on the proto package name (lumirpc)
include!(concat!(env!("OUT_DIR"), "/lumirpc.rs"));

pub use resource_provider_client::ResourceProviderClient;
pub use resource_provider_server::{
    ResourceProvider as ResourceProviderService, ResourceProviderServer,
};

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn messages_encode_and_decode() {
        let request = InspectChangeRequest {
            id: "sg-1".to_string(),
            r#type: "aws:ec2/securityGroup:SecurityGroup".to_string(),
            olds: Some(::prost_types::Struct::default()),
            news: None,
            unknowns: vec!["vpc".to_string()],
        };
        let bytes = request.encode_to_vec();
        assert_eq!(InspectChangeRequest::decode(bytes.as_slice()).ok(), Some(request));
    }

    #[test]
    fn service_name_matches_proto_package() {
        assert_eq!(
            <ResourceProviderServer<()> as tonic::server::NamedService>::NAME,
            "lumirpc.ResourceProvider"
        );
    }
}

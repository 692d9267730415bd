// Protobuf wire types for the WebSocket channel.
// Declared with prost derives directly so the server builds without protoc;
// field tags are the wire contract shared with clients:
//   chatosi.chat -> proto::chat
//   chatosi.ws   -> proto::ws

pub mod chat {
    /// A persisted direct message as pushed to live connections.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChatMessage {
        #[prost(string, tag = "1")]
        pub id: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub sender_id: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub receiver_id: ::prost::alloc::string::String,
        #[prost(string, optional, tag = "4")]
        pub text: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(string, optional, tag = "5")]
        pub image: ::core::option::Option<::prost::alloc::string::String>,
        /// Unix millis
        #[prost(int64, tag = "6")]
        pub created_at: i64,
        #[prost(bool, tag = "7")]
        pub is_read: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MessageDeliveredEvent {
        #[prost(message, optional, tag = "1")]
        pub message: ::core::option::Option<ChatMessage>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MarkReadRequest {
        #[prost(string, tag = "1")]
        pub other_user_id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MarkReadResponse {
        #[prost(uint64, tag = "1")]
        pub updated: u64,
    }
}

pub mod presence {
    /// Full online set. Replaces whatever the client held before.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PresenceEvent {
        #[prost(string, repeated, tag = "1")]
        pub online_user_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PresenceRequest {}
}

pub mod ws {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Envelope {
        #[prost(string, tag = "1")]
        pub request_id: ::prost::alloc::string::String,
        #[prost(oneof = "envelope::Payload", tags = "10, 11, 12, 20, 21, 99")]
        pub payload: ::core::option::Option<envelope::Payload>,
    }

    pub mod envelope {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Payload {
            #[prost(message, tag = "10")]
            PresenceEvent(super::super::presence::PresenceEvent),
            #[prost(message, tag = "11")]
            PresenceRequest(super::super::presence::PresenceRequest),
            #[prost(message, tag = "12")]
            MessageDeliveredEvent(super::super::chat::MessageDeliveredEvent),
            #[prost(message, tag = "20")]
            MarkReadRequest(super::super::chat::MarkReadRequest),
            #[prost(message, tag = "21")]
            MarkReadResponse(super::super::chat::MarkReadResponse),
            #[prost(message, tag = "99")]
            Error(super::ErrorResponse),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ErrorResponse {
        #[prost(uint32, tag = "1")]
        pub code: u32,
        #[prost(string, tag = "2")]
        pub message: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub request_id: ::prost::alloc::string::String,
    }
}

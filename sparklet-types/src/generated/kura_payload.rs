// Kura payload definition (kurapayload.proto), used by Sparkplug A.
// Position data is not modelled and is skipped when decoding.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KuraPayload {
    #[prost(int64, optional, tag = "1")]
    pub timestamp: ::core::option::Option<i64>,
    #[prost(message, repeated, tag = "5000")]
    pub metric: ::prost::alloc::vec::Vec<kura_payload::KuraMetric>,
    #[prost(bytes = "vec", optional, tag = "5001")]
    pub body: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}

/// Nested message and enum types in `KuraPayload`.
pub mod kura_payload {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct KuraMetric {
        #[prost(string, required, tag = "1")]
        pub name: ::prost::alloc::string::String,
        #[prost(enumeration = "kura_metric::ValueType", required, tag = "2")]
        pub r#type: i32,
        #[prost(double, optional, tag = "3")]
        pub double_value: ::core::option::Option<f64>,
        #[prost(float, optional, tag = "4")]
        pub float_value: ::core::option::Option<f32>,
        #[prost(int64, optional, tag = "5")]
        pub long_value: ::core::option::Option<i64>,
        #[prost(int32, optional, tag = "6")]
        pub int_value: ::core::option::Option<i32>,
        #[prost(bool, optional, tag = "7")]
        pub bool_value: ::core::option::Option<bool>,
        #[prost(string, optional, tag = "8")]
        pub string_value: ::core::option::Option<::prost::alloc::string::String>,
        #[prost(bytes = "vec", optional, tag = "9")]
        pub bytes_value: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
    }

    /// Nested message and enum types in `KuraMetric`.
    pub mod kura_metric {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ValueType {
            Double = 0,
            Float = 1,
            Int64 = 2,
            Int32 = 3,
            Bool = 4,
            String = 5,
            Bytes = 6,
        }
    }
}

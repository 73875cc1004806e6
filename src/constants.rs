/// Protocol name used by MQTT 3.1.1.
pub const PROTOCOL_NAME: &str = "MQTT";

/// Protocol level used by MQTT 3.1.1.
pub const PROTOCOL_LEVEL: u8 = 4;

/// Protocol name used by MQTT 3.1.
pub const LEGACY_PROTOCOL_NAME: &str = "MQIsdp";

/// Protocol level used by MQTT 3.1.
pub const LEGACY_PROTOCOL_LEVEL: u8 = 3;

/// Largest value the remaining length field can carry (4 encoded bytes).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Maximum number of bytes used to encode the remaining length.
pub const MAX_REMAINING_LENGTH_BYTES: usize = 4;

/// Maximum allowed length for a UTF-8 encoded string.
pub const MAX_STRING_LENGTH: usize = 65_535;

/// Maximum client identifier length accepted for MQTT 3.1 clients.
pub const LEGACY_MAX_CLIENT_ID_LENGTH: usize = 23;

/// Smallest possible CONNECT variable header: protocol name "MQTT" (2 + 4 bytes),
/// protocol level, connect flags and keep alive.
pub const CONNECT_VARIABLE_HEADER_MIN_LEN: usize = 10;

/// Size of a packet identifier / message id.
pub const MESSAGE_ID_LEN: usize = 2;

/// Size of the CONNACK variable header: acknowledge flags + return code.
pub const CONNACK_VARIABLE_HEADER_LEN: usize = 2;

/// Default bind host when none is given on the command line.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default MQTT port.
pub const DEFAULT_PORT: u16 = 1883;

/// Initial capacity of the per-connection read buffer.
pub const READ_BUFFER_CAPACITY: usize = 4096;

/// Capacity of the broker event queue.
pub const BROKER_EVENT_QUEUE_CAPACITY: usize = 1000;

/// Outbound packets queued per connection before it counts as a slow consumer.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1000;

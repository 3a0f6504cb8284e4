// Field offsets and payload constants of the Munich IO protocol.
// Command key structure is IIIIIII-F-DDD with the instance above it.

/// First bit of the device instance id
pub const OFFSET_TO_END: u32 = 11;

/// First bit of the command family (I)
pub const OFFSET_TO_I: u32 = 4;

/// Flag bit (F)
pub const OFFSET_TO_F: u32 = 3;

/// First bit of the sub-opcode (D)
pub const OFFSET_TO_D: u32 = 0;

/// Number of instance id bits left above `OFFSET_TO_END`
pub const INSTANCE_ID_BITS: u32 = 32 - OFFSET_TO_END;

pub const OFFSET_FOR_TIMESTAMPS: u32 = 29;
pub const OFFSET_FOR_RETINA_SIZE: u32 = 26;
pub const SENSOR_ID_OFFSET: u32 = 27;

/// Wide uart id offset, used by generic, retina, sensor and motor commands
pub const OFFSET_FOR_UART_ID: u32 = 2 + SENSOR_ID_OFFSET;

/// Narrow uart id offset, used only by laser/LED frequency and speaker tone/melody
pub const PUSH_BOT_UART_OFFSET_SPEAKER_LED_LASER: u32 = 1;

/// Offset of the polling period in a continuous sensor poll payload.
/// Bits above 32 are truncated.
pub const OFFSET_FOR_SENSOR_TIME: u32 = 31;

// Reserved keys, never emitted
pub const UNUSED_ID_0_DIM_6_KEY: u32 = 6 << OFFSET_TO_D;
pub const UNUSED_ID_6: u32 = 6 << OFFSET_TO_I;
pub const UNUSED_ID_7: u32 = 7 << OFFSET_TO_I;

// Retina transmission payloads: timestamp size
pub const PAYLOAD_NO_TIMESTAMPS: u32 = 0;
pub const PAYLOAD_DELTA_TIMESTAMPS: u32 = 1 << OFFSET_FOR_TIMESTAMPS;
pub const PAYLOAD_TWO_BYTE_TIME_STAMPS: u32 = 2 << OFFSET_FOR_TIMESTAMPS;
pub const PAYLOAD_THREE_BYTE_TIME_STAMPS: u32 = 3 << OFFSET_FOR_TIMESTAMPS;
pub const PAYLOAD_FOUR_BYTE_TIME_STAMPS: u32 = 4 << OFFSET_FOR_TIMESTAMPS;

// Retina transmission payloads: down sampling
pub const PAYLOAD_RETINA_NO_DOWN_SAMPLING_IN_PAYLOAD: u32 = 0;
pub const PAYLOAD_RETINA_NO_DOWN_SAMPLING: u32 = 1 << OFFSET_FOR_RETINA_SIZE;
pub const PAYLOAD_RETINA_64_DOWN_SAMPLING: u32 = 2 << OFFSET_FOR_RETINA_SIZE;
pub const PAYLOAD_RETINA_32_DOWN_SAMPLING: u32 = 3 << OFFSET_FOR_RETINA_SIZE;
pub const PAYLOAD_RETINA_16_DOWN_SAMPLING: u32 = 4 << OFFSET_FOR_RETINA_SIZE;

/// Shift of the bias value in a bias payload
pub const BIAS_VALUE_OFFSET: u32 = 8;

/// Default TCP port of the push bot WiFi module
pub const DEFAULT_ROBOT_PORT: u16 = 56000;

/// Read size for one receive from the robot
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Number of neurons in a push bot control module
pub const CONTROL_MODULE_NEURONS: u8 = 15;

/// Payload sent to the generic motor enable/disable command to enable motors
pub const MOTOR_ENABLE: u32 = 1;

/// Velocity clamp of the text protocol
pub const MAX_TEXT_VELOCITY: i32 = 100;

pub mod cmd_result;
pub mod door_event;
pub mod heartbeat;
pub mod meta_data;
pub mod noise_level;
pub mod rfid_event;
pub mod rfid_snapshot;
pub mod temp_hum;
pub mod topchange_event;

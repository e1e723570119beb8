pub mod recording_store;

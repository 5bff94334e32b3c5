use pyo3::pymodule;

mod audio_engine;
mod controller;
mod keyboard;
mod messages;
mod metronome;
mod pads;
mod persistence;
mod playlist;
mod recorder;
mod settings;
mod soundboard;

/// The Python module implemented in Rust.
#[pymodule]
mod soundpad_audio {
    #[pymodule_export]
    use super::soundboard::Soundboard;

    #[pymodule_export]
    use super::messages::AudioMessage;
}

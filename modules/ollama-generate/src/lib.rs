//! Ollama `/api/generate` integration module.
//!
//! Build with `cargo build --target wasm32-unknown-unknown --release` and
//! point a manifest's `module.wasm` at the resulting `ollama_generate.wasm`.

#[cfg(target_arch = "wasm32")]
floatkit::module_entry!(generate_ollama);

//! Obtiene la URL RTMP y la clave de transmisión de TikTok LIVE a través de la
//! API de Streamlabs, y arranca/termina la transmisión.
//!
//! - `credentials`: token guardado por Streamlabs Desktop en el disco.
//! - `auth`: login de TikTok en Chrome + canje PKCE por el token.
//! - `streamlabs`: las cuatro llamadas REST con el token.
//! - `session`: máquina de estados que orquesta todo lo anterior.
//! - `ui`: interfaz de terminal.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod session;
pub mod settings;
pub mod streamlabs;
pub mod ui;
pub mod updater;

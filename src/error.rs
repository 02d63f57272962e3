use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// No hay token local, ni resultado de búsqueda, ni código de autorización
    NotFound(String),
    /// El login no terminó dentro del tiempo límite
    Timeout(u64),
    /// Respuesta no 2xx o `success: false` del proveedor
    RemoteFailure { status: Option<u16>, message: String },
    /// JSON inválido o faltan campos esperados
    MalformedResponse(String),
    UnsupportedPlatform(String),
    BrowserLaunchFailed(String),
    /// Chrome ya abierto rechazó una orden (navegar, cookies)
    Browser(String),
    ExchangeFailed(String),
    NoActiveSession,
    InvalidState(String),
    Io(std::io::Error),
    Http(reqwest::Error),
}

impl Error {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::RemoteFailure {
            status,
            message: message.into(),
        }
    }

    /// Un 401/403 del proveedor suele significar que el token ya no sirve.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::RemoteFailure {
                status: Some(401 | 403),
                ..
            }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "No encontrado: {}", what),
            Self::Timeout(secs) => write!(f, "Tiempo de espera agotado ({}s)", secs),
            Self::RemoteFailure {
                status: Some(status),
                message,
            } => write!(f, "Error del servidor ({}): {}", status, message),
            Self::RemoteFailure {
                status: None,
                message,
            } => write!(f, "Error del servidor: {}", message),
            Self::MalformedResponse(msg) => write!(f, "Respuesta inválida: {}", msg),
            Self::UnsupportedPlatform(os) => {
                write!(f, "Sistema operativo no soportado para buscar el token local: {}", os)
            }
            Self::BrowserLaunchFailed(msg) => {
                write!(f, "No se pudo iniciar Google Chrome: {}", msg)
            }
            Self::Browser(msg) => write!(f, "Error del navegador: {}", msg),
            Self::ExchangeFailed(msg) => write!(f, "No se pudo obtener el token: {}", msg),
            Self::NoActiveSession => write!(f, "No hay ninguna transmisión activa"),
            Self::InvalidState(msg) => write!(f, "{}", msg),
            Self::Io(e) => write!(f, "Error de E/S: {}", e),
            Self::Http(e) => write!(f, "Error de red: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::MalformedResponse(e.to_string());
        }
        Self::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedResponse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_only_for_auth_statuses() {
        assert!(Error::remote(Some(401), "x").is_unauthorized());
        assert!(Error::remote(Some(403), "x").is_unauthorized());
        assert!(!Error::remote(Some(500), "x").is_unauthorized());
        assert!(!Error::remote(None, "x").is_unauthorized());
        assert!(!Error::NoActiveSession.is_unauthorized());
    }
}

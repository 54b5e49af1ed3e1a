//! Extraction of a UsernameToken from an inbound SOAP envelope

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::WsSecurityError;

/// UsernameToken fields as they appeared on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct UsernameToken {
    pub username: String,
    /// Base64 password digest
    pub password_digest: String,
    /// Base64 nonce
    pub nonce: String,
    /// `wsu:Created`, RFC 3339
    pub created: String,
}

#[derive(Clone, Copy)]
enum Field {
    Username,
    Password,
    Nonce,
    Created,
}

/// Parse `Header/Security/UsernameToken`. Prefixes are ignored, only local
/// names are matched.
pub fn parse_username_token(xml: &str) -> Result<UsernameToken, WsSecurityError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_security = false;
    let mut in_token = false;
    let mut field: Option<Field> = None;

    let mut username = None;
    let mut password_digest = None;
    let mut nonce = None;
    let mut created = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Security" => saw_security = true,
                b"UsernameToken" if saw_security => in_token = true,
                b"Username" if in_token => field = Some(Field::Username),
                b"Password" if in_token => field = Some(Field::Password),
                b"Nonce" if in_token => field = Some(Field::Nonce),
                b"Created" if in_token => field = Some(Field::Created),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Security" => saw_security = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"UsernameToken" => in_token = false,
                _ => field = None,
            },
            Ok(Event::Text(t)) => {
                if let Some(f) = field {
                    let text = t
                        .unescape()
                        .map_err(|e| WsSecurityError::XmlError(e.to_string()))?
                        .into_owned();
                    match f {
                        Field::Username => username = Some(text),
                        Field::Password => password_digest = Some(text),
                        Field::Nonce => nonce = Some(text),
                        Field::Created => created = Some(text),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(WsSecurityError::XmlError(e.to_string())),
            _ => {}
        }
    }

    if !saw_security {
        return Err(WsSecurityError::MissingSecurityHeader);
    }

    let missing = |name: &str| WsSecurityError::MissingElement(name.to_string());
    Ok(UsernameToken {
        username: username.ok_or_else(|| missing("Username"))?,
        password_digest: password_digest.ok_or_else(|| missing("Password"))?,
        nonce: nonce.ok_or_else(|| missing("Nonce"))?,
        created: created.ok_or_else(|| missing("Created"))?,
    })
}

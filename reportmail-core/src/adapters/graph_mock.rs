//! Mock Graph mail server for testing
//!
//! Serves the subset of the Graph mail API the `GraphMailbox` uses:
//! - GET /users/{mb}/mailFolders/inbox/messages returns { value: [...] }
//! - GET /users/{mb}/messages/{id}/attachments returns { value: [...] }
//! - PATCH /users/{mb}/messages/{id} marks the message read
//! - POST /users/{mb}/messages/{id}/move removes it from the inbox
//!
//! Unknown message ids answer 404, like Graph does for moved messages.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::json;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub id: String,
    pub subject: String,
    pub attachment_name: String,
    pub is_read: bool,
}

impl MockMessage {
    pub fn new(id: &str, subject: &str, attachment_name: &str) -> Self {
        Self {
            id: id.to_string(),
            subject: subject.to_string(),
            attachment_name: attachment_name.to_string(),
            is_read: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockGraphConfig {
    pub messages: Vec<MockMessage>,
    /// Answer every request with 401
    pub fail_auth: bool,
}

pub struct MockGraphServer {
    port: u16,
    running: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MockGraphServer {
    /// Start a new mock server on a random available port
    pub fn start(config: MockGraphConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let fail_auth = config.fail_auth;
        let inbox = Arc::new(Mutex::new(config.messages));

        listener.set_nonblocking(true)?;

        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let inbox = inbox.clone();
                        thread::spawn(move || handle_connection(stream, &inbox, fail_auth));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}/v1.0", self.port)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockGraphServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_connection(mut stream: TcpStream, inbox: &Mutex<Vec<MockMessage>>, fail_auth: bool) {
    let _ = stream.set_nonblocking(false);
    let mut buffer = [0; 8192];
    let Ok(n) = stream.read(&mut buffer) else {
        return;
    };
    let request = String::from_utf8_lossy(&buffer[..n]);

    let first_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 {
        send_response(&mut stream, 400, "Bad Request", r#"{"error": "Invalid request"}"#);
        return;
    }
    let method = parts[0];
    let path = parts[1].split('?').next().unwrap_or(parts[1]);

    let has_valid_auth = request.to_lowercase().contains("authorization: bearer test_");
    if fail_auth || !has_valid_auth {
        send_response(&mut stream, 401, "Unauthorized", r#"{"error": "InvalidAuthenticationToken"}"#);
        return;
    }

    // ["", "v1.0", "users", mailbox, ...rest]
    let segments: Vec<&str> = path.split('/').collect();
    let rest: &[&str] = if segments.len() > 4 { &segments[4..] } else { &[] };
    let mut inbox = match inbox.lock() {
        Ok(inbox) => inbox,
        Err(_) => return,
    };

    match (method, rest) {
        ("GET", ["mailFolders", "inbox", "messages"]) => {
            let value: Vec<_> = inbox
                .iter()
                .filter(|m| !m.is_read)
                .map(|m| {
                    json!({
                        "id": m.id,
                        "subject": m.subject,
                        "from": { "emailAddress": { "address": "reports@example.com" } },
                        "hasAttachments": true
                    })
                })
                .collect();
            send_response(&mut stream, 200, "OK", &json!({ "value": value }).to_string());
        }
        ("GET", ["messages", id, "attachments"]) => match inbox.iter().find(|m| m.id == *id) {
            Some(m) => {
                let body = json!({
                    "value": [
                        {
                            "@odata.type": "#microsoft.graph.fileAttachment",
                            "name": m.attachment_name,
                            "contentType": "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                            "contentBytes": "UEs="
                        },
                        {
                            "@odata.type": "#microsoft.graph.itemAttachment",
                            "name": "forwarded message"
                        }
                    ]
                });
                send_response(&mut stream, 200, "OK", &body.to_string());
            }
            None => send_response(&mut stream, 404, "Not Found", r#"{"error": "ErrorItemNotFound"}"#),
        },
        ("PATCH", ["messages", id]) => match inbox.iter_mut().find(|m| m.id == *id) {
            Some(m) => {
                m.is_read = true;
                send_response(&mut stream, 200, "OK", &json!({ "id": m.id, "isRead": true }).to_string());
            }
            None => send_response(&mut stream, 404, "Not Found", r#"{"error": "ErrorItemNotFound"}"#),
        },
        ("POST", ["messages", id, "move"]) => match inbox.iter().position(|m| m.id == *id) {
            Some(i) => {
                let moved = inbox.remove(i);
                send_response(&mut stream, 201, "Created", &json!({ "id": moved.id }).to_string());
            }
            None => send_response(&mut stream, 404, "Not Found", r#"{"error": "ErrorItemNotFound"}"#),
        },
        _ => send_response(&mut stream, 404, "Not Found", r#"{"error": "Endpoint not found"}"#),
    }
}

fn send_response(stream: &mut TcpStream, status: u16, status_text: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

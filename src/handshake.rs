use std::collections::HashMap;

use base64::Engine as _;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::WsError;

/// the magic GUID RFC 6455 appends to the client key before hashing
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `Base64(SHA1(key ++ GUID))`, the Sec-WebSocket-Accept token (4.2)
pub(crate) fn accept_token(key: &str) -> String {
    let concatenated = format!("{key}{WS_GUID}");
    let digest = sha1_smol::Sha1::from(concatenated).hexdigest();
    let digest_bytes = hex::decode(digest).expect("sha1 hexdigest is always valid hex");
    base64::engine::general_purpose::STANDARD.encode(digest_bytes)
}

/// request headers parsed out of the HTTP/1.1 upgrade request, keyed exactly
/// as received on the wire (4.1 step 2)
pub type Headers = HashMap<String, String>;

/// reads the client's HTTP/1.1 request head up to the blank line, parsing out
/// `name: value` header lines. the request line itself is skipped.
async fn read_request_head<R>(reader: &mut BufReader<R>) -> Result<Headers, WsError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .map_err(WsError::TransportRead)?;
    line.clear();

    let mut headers = Headers::new();
    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(WsError::TransportRead)?;
        if n == 0 {
            return Err(WsError::HandshakeMalformed("connection closed before blank line".into()));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(": ") {
            headers.insert(name.to_string(), value.to_string());
        }
    }
    Ok(headers)
}

/// runs the opening handshake to completion: read the request head, locate
/// Sec-WebSocket-Key, emit the 101 response. Returns the parsed headers on
/// success so the session can hand them to the application via get_headers.
///
/// takes the session's own `BufReader` rather than wrapping a fresh one: any
/// bytes buffered past the blank line (a client that pipelines its first
/// frame right after the handshake) must survive into the frame-reading loop.
pub(crate) async fn perform<S>(stream: &mut BufReader<S>) -> Result<Headers, WsError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let headers = read_request_head(stream).await?;

    let key = headers
        .get("Sec-WebSocket-Key")
        .ok_or_else(|| WsError::HandshakeMalformed("missing Sec-WebSocket-Key".into()))?;
    let accept = accept_token(key);

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(WsError::TransportWrite)?;
    stream.flush().await.map_err(WsError::TransportWrite)?;

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_rfc6455_worked_example() {
        assert_eq!(
            accept_token("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[tokio::test]
    async fn completes_handshake_over_a_duplex_stream() {
        let (mut client, server) = tokio::io::duplex(4096);
        let mut server = BufReader::new(server);
        let request = "GET /chat HTTP/1.1\r\n\
             Host: example.com\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n";

        let client_write = tokio::spawn(async move {
            client.write_all(request.as_bytes()).await.unwrap();
            client
        });

        let headers = perform(&mut server).await.unwrap();
        assert_eq!(
            headers.get("Sec-WebSocket-Key").map(String::as_str),
            Some("dGhlIHNhbXBsZSBub25jZQ==")
        );

        let mut client = client_write.await.unwrap();
        let mut response = [0u8; 1024];
        let n = tokio::io::AsyncReadExt::read(&mut client, &mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response[..n]);
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }

    #[tokio::test]
    async fn fails_when_key_is_missing() {
        let (mut client, server) = tokio::io::duplex(4096);
        let mut server = BufReader::new(server);
        let request = "GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        tokio::spawn(async move {
            client.write_all(request.as_bytes()).await.unwrap();
            // keep `client` alive until the handshake attempt completes
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        });
        let result = perform(&mut server).await;
        assert!(matches!(result, Err(WsError::HandshakeMalformed(_))));
    }
}

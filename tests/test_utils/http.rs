//! HTTP helpers for exercising the real Gitter clients
//!
//! Plain request/response cases go through `httpmock`. A mock response always
//! ends, so a stream that stays open is served from a raw socket here.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Client that never routes localhost traffic through a proxy from the environment
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Serve a 200 response that writes `lines` and then never ends. Returns the
/// base URL; every path gets the same stream.
pub async fn open_stream(lines: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let lines = lines.clone();
            tokio::spawn(async move {
                let _ = hold_open(socket, &lines).await;
            });
        }
    });

    format!("http://{}", addr)
}

async fn hold_open(mut socket: TcpStream, lines: &[String]) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }

    socket
        .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n")
        .await?;
    for line in lines {
        socket.write_all(line.as_bytes()).await?;
        socket.write_all(b"\n").await?;
        socket.flush().await?;
    }
    std::future::pending::<()>().await;
    Ok(())
}

use actix::{Actor, Addr};
use actix_web::web::Data;
use bully::http::{self, HttpTransport};
use bully::{Config, GetStatus, LocalEvent, Node, StartElection};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::parse()
        .validate()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let transport = Arc::new(HttpTransport::new(config.rpc_timeout()).map_err(io::Error::other)?);
    let node = Node::new(config.clone(), transport)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let inbox = node.inbox();
    let node = node.start();

    let server = http::server(
        Data::new(http::App {
            inbox,
            node: node.clone(),
        }),
        &config.host,
        config.port,
    )?;
    let handle = server.handle();
    let server = actix_web::rt::spawn(server);

    if io::stdin().is_terminal() {
        console(config.id, node).await?;
        handle.stop(true).await;
    } else {
        info!("running without a terminal, stop with Ctrl+C");
    }
    server.await.map_err(io::Error::other)?
}

/// Operator commands, one per line.
async fn console(id: u64, node: Addr<Node<HttpTransport>>) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("command> ");
        io::stdout().flush()?;
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => return Ok(()),
        };
        match line.trim() {
            "" => continue,
            "exit" | "quit" => {
                info!("[{}] shutting down", id);
                return Ok(());
            }
            "status" => {
                let status = node.send(GetStatus).await.map_err(io::Error::other)?;
                info!("[{}][{}] leader={:?}", status.id, status.clock, status.leader);
            }
            "election" => node.do_send(StartElection),
            event => {
                node.send(LocalEvent(event.to_string()))
                    .await
                    .map_err(io::Error::other)?;
            }
        }
    }
}

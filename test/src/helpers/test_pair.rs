use std::{net::SocketAddr, sync::Arc};

use ghostnet_interface::{ConnectionKey, InterfaceConfig, NetInterface};
use ghostnet_shared::{
    ConnectionConfig, GameInstant, HostType, MemoryFileStore, NetConnection, Protocol,
};

use crate::{
    helpers::recording_handler::{HandlerLog, RecordingHandler},
    local_socket::{LocalSocketPair, CLIENT_ADDR, SERVER_ADDR},
    test_protocol::protocol,
};

/// Milliseconds of simulated time per [`TestPair::tick`]
pub const TICK_MS: u32 = 25;

/// How the two ends of a [`TestPair`] are set up
#[derive(Clone)]
pub struct PairOptions {
    pub server_protocol: Arc<Protocol>,
    pub client_protocol: Arc<Protocol>,
    pub interface: InterfaceConfig,
    pub connection: ConnectionConfig,
    /// Server ghosts to the client
    pub ghosting: bool,
    pub translate_strings: bool,
    /// Files the server can upload
    pub server_files: MemoryFileStore,
    /// The server's handler refuses every connect request with this reason
    pub refuse_with: Option<String>,
}

impl Default for PairOptions {
    fn default() -> Self {
        let protocol = protocol();
        Self {
            server_protocol: protocol.clone(),
            client_protocol: protocol,
            interface: InterfaceConfig::default(),
            connection: ConnectionConfig::default(),
            ghosting: false,
            translate_strings: false,
            server_files: MemoryFileStore::new(),
            refuse_with: None,
        }
    }
}

/// A server and a client interface joined by a [`LocalSocketPair`], driven
/// by a simulated clock
pub struct TestPair {
    pub server: NetInterface,
    pub client: NetInterface,
    pub sockets: LocalSocketPair,
    pub server_log: HandlerLog,
    pub client_log: HandlerLog,
    pub client_key: ConnectionKey,
    pub now: GameInstant,
}

impl TestPair {
    /// Builds both ends and sends the client's first challenge
    pub fn new(options: PairOptions) -> Self {
        let sockets = LocalSocketPair::new();
        let server_log = HandlerLog::new();
        let client_log = HandlerLog::new();
        let now = GameInstant::from_millis(1000);

        let mut server = NetInterface::new(options.interface.clone()).expect("challenge key");
        let (sender, receiver) = sockets.server_socket();
        server.listen(sender, receiver);
        let factory_options = options.clone();
        let factory_log = server_log.clone();
        server.set_connection_factory(move |_address: &SocketAddr| {
            Some(server_connection(&factory_options, &factory_log))
        });

        let mut client = NetInterface::new(options.interface.clone()).expect("challenge key");
        let (sender, receiver) = sockets.client_socket();
        client.listen(sender, receiver);
        let client_key = client
            .connect(client_connection(&options, &client_log), SERVER_ADDR, now)
            .expect("client has a transport");

        Self {
            server,
            client,
            sockets,
            server_log,
            client_log,
            client_key,
            now,
        }
    }

    /// Builds both ends and runs the handshake to completion
    pub fn connected(options: PairOptions) -> Self {
        let mut pair = Self::new(options);
        assert!(
            pair.tick_until(20, |pair| pair.is_connected()),
            "handshake did not complete"
        );
        pair
    }

    pub fn is_connected(&self) -> bool {
        self.client.connection(&self.client_key).is_some() && self.server_key().is_some()
    }

    pub fn server_key(&self) -> Option<ConnectionKey> {
        self.server.find_connection(&CLIENT_ADDR)
    }

    pub fn server_connection(&mut self) -> &mut NetConnection {
        let key = self.server_key().expect("server holds a connection");
        self.server.connection_mut(&key).expect("server connection")
    }

    pub fn client_connection(&mut self) -> &mut NetConnection {
        self.client
            .connection_mut(&self.client_key)
            .expect("client connection")
    }

    /// Advances the clock one step: both sides read what arrived, then send
    pub fn tick(&mut self) {
        self.now = self.now.add_millis(TICK_MS);
        self.server.process(self.now);
        self.client.process(self.now);
        self.server.send_packets(self.now);
        self.client.send_packets(self.now);
    }

    pub fn tick_n(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Ticks until `done` holds, at most `max_ticks` times. Returns whether
    /// it ever held.
    pub fn tick_until<F: FnMut(&mut TestPair) -> bool>(&mut self, max_ticks: usize, mut done: F) -> bool {
        for _ in 0..max_ticks {
            if done(self) {
                return true;
            }
            self.tick();
        }
        done(self)
    }
}

pub fn client_connection(options: &PairOptions, log: &HandlerLog) -> NetConnection {
    let mut connection = NetConnection::new(
        options.client_protocol.clone(),
        options.connection.clone(),
        HostType::Client,
        Box::new(RecordingHandler::new(log.clone())),
    );
    connection
        .set_ghost_to(options.ghosting)
        .expect("fresh connection");
    connection
        .set_translates_strings(options.translate_strings)
        .expect("fresh connection");
    connection
}

pub fn server_connection(options: &PairOptions, log: &HandlerLog) -> NetConnection {
    let handler = match &options.refuse_with {
        Some(reason) => RecordingHandler::refusing(log.clone(), reason),
        None => RecordingHandler::new(log.clone()),
    };
    let mut connection = NetConnection::new(
        options.server_protocol.clone(),
        options.connection.clone(),
        HostType::Server,
        Box::new(handler),
    );
    connection
        .set_ghost_from(options.ghosting)
        .expect("fresh connection");
    connection
        .set_translates_strings(options.translate_strings)
        .expect("fresh connection");
    connection.set_file_store(Box::new(options.server_files.clone()));
    connection
}

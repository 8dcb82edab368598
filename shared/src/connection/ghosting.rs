use log::{info, warn};

use crate::{
    connection::{error::ConnectionError, net_connection::NetConnection},
    constants::FILE_CHUNKS_IN_FLIGHT,
    events::{
        connection_message::{ConnectionMessage, ConnectionMessageEvent},
        file_events::{FileChunkEvent, FileDownloadRequestEvent},
        ghost_always_event::GhostAlwaysObjectEvent,
        net_event::{downcast_event, event_is, NetEvent},
        net_string_event::NetStringEvent,
    },
    files::{
        error::FileTransferError,
        file_transfer::{ChunkOutcome, UploadStart},
    },
    game_time::GameInstant,
    ghosts::{error::GhostError, ghost_receiver::SavedGhost, object_registry::ObjectRegistry},
};

const INVALID_PACKET: &str = "Invalid packet.";

enum SavedFront {
    Empty,
    EndMarker,
    Object { required_files: Vec<String> },
}

impl NetConnection {
    /// Routes a received event: connection internals are handled here,
    /// application events are queued for the owner
    pub(super) fn process_event(&mut self, _now: GameInstant, event: Box<dyn NetEvent>) {
        if event_is::<ConnectionMessageEvent>(event.as_ref()) {
            if let Some(message) = downcast_event::<ConnectionMessageEvent>(event) {
                self.handle_connection_message(*message);
            }
        } else if event_is::<GhostAlwaysObjectEvent>(event.as_ref()) {
            if let Some(ghost_always) = downcast_event::<GhostAlwaysObjectEvent>(event) {
                self.set_ghost_always_object(*ghost_always);
            }
        } else if event_is::<NetStringEvent>(event.as_ref()) {
            // mapped while the packet was read
        } else if event_is::<FileDownloadRequestEvent>(event.as_ref()) {
            if let Some(request) = downcast_event::<FileDownloadRequestEvent>(event) {
                self.handle_file_download_request(request.names);
            }
        } else if event_is::<FileChunkEvent>(event.as_ref()) {
            if let Some(chunk) = downcast_event::<FileChunkEvent>(event) {
                self.handle_file_chunk(&chunk.data);
            }
        } else {
            self.incoming_events.push_back(event);
        }
    }

    fn send_connection_message(&mut self, message: ConnectionMessage, sequence: u32, count: u32) {
        self.post_internal(Box::new(ConnectionMessageEvent::new(message, sequence, count)));
    }

    fn handle_connection_message(&mut self, event: ConnectionMessageEvent) {
        if event.message.requires_ghost_receiver() && self.ghost_to.is_none() {
            self.set_last_error(INVALID_PACKET);
            return;
        }

        match event.message {
            ConnectionMessage::GhostAlwaysDone => {
                let Some(ghost_to) = self.ghost_to.as_mut() else {
                    return;
                };
                ghost_to.set_ghosting_sequence(event.sequence);
                ghost_to.push_saved(SavedGhost::EndMarker);
                if ghost_to.save_list_len() == 1 {
                    self.load_next_ghost_always_object(true);
                }
            }
            ConnectionMessage::ReadyForNormalGhosts => {
                let Some(ghost_from) = self.ghost_from.as_mut() else {
                    warn!("NetConnection: ReadyForNormalGhosts on a connection that does not ghost");
                    return;
                };
                if ghost_from.ready_for_normal_ghosts(event.sequence) {
                    info!("NetConnection: ghost always objects received by peer");
                    self.handler.on_ready_for_normal_ghosts();
                }
            }
            ConnectionMessage::EndGhosting => {
                if let Some(ghost_to) = self.ghost_to.as_mut() {
                    ghost_to.clear_all();
                }
            }
            ConnectionMessage::GhostAlwaysStarting => {
                self.handler.on_ghost_always_started(event.ghost_count);
            }
            ConnectionMessage::SendNextDownloadRequest => {
                self.send_next_file_download_request();
            }
            ConnectionMessage::FileDownloadSize => {
                self.files.begin_download(event.ghost_count as usize);
            }
        }
    }

    // Ghosting lifecycle

    /// Starts ghosting: delivers every scope-always object, then lets the
    /// peer ask for normal ghost updates
    pub fn activate_ghosting(&mut self, objects: &ObjectRegistry) -> Result<(), ConnectionError> {
        let ghost_from = self.ghost_from.as_mut().ok_or(GhostError::NotGhostingFrom)?;
        let events = ghost_from.activate(objects)?;
        for event in events {
            self.post_internal(event);
        }
        Ok(())
    }

    /// Stops ghosting and frees every ghost; the peer deletes its copies
    pub fn reset_ghosting(&mut self) {
        let Some(ghost_from) = self.ghost_from.as_mut() else {
            return;
        };
        let message = ghost_from.reset();
        for notify in self.notifies.iter_mut() {
            ghost_from.packet_received(&notify.ghosts);
            notify.ghosts.clear();
        }
        ghost_from.free_all();
        self.post_internal(Box::new(message));
    }

    pub fn is_ghosting(&self) -> bool {
        self.ghost_from
            .as_ref()
            .map(|ghost_from| ghost_from.is_ghosting())
            .unwrap_or(false)
    }

    fn set_ghost_always_object(&mut self, event: GhostAlwaysObjectEvent) {
        let Some(object) = event.object else {
            self.set_last_error(INVALID_PACKET);
            return;
        };
        let Some(ghost_to) = self.ghost_to.as_mut() else {
            self.set_last_error(INVALID_PACKET);
            return;
        };
        ghost_to.push_saved(SavedGhost::Object {
            index: event.ghost_index,
            object,
        });
        // a longer list means an earlier object is waiting for files
        if ghost_to.save_list_len() == 1 {
            self.load_next_ghost_always_object(true);
        }
    }

    fn saved_front(&self) -> SavedFront {
        match self.ghost_to.as_ref().and_then(|ghost_to| ghost_to.front_saved()) {
            None => SavedFront::Empty,
            Some(SavedGhost::EndMarker) => SavedFront::EndMarker,
            Some(SavedGhost::Object { object, .. }) => SavedFront::Object {
                required_files: object.required_files(),
            },
        }
    }

    /// Installs saved ghost-always objects in order until one needs files
    /// that are not in the store yet
    pub(super) fn load_next_ghost_always_object(&mut self, mut had_new_files: bool) {
        loop {
            match self.saved_front() {
                SavedFront::Empty => return,
                SavedFront::EndMarker => {
                    let Some(ghost_to) = self.ghost_to.as_mut() else {
                        return;
                    };
                    ghost_to.pop_saved();
                    let sequence = ghost_to.ghosting_sequence();
                    self.send_connection_message(ConnectionMessage::ReadyForNormalGhosts, sequence, 0);
                    info!("NetConnection: ghost always objects received");
                    self.handler.on_ghost_always_objects_received();
                    return;
                }
                SavedFront::Object { required_files } => {
                    let missing: Vec<String> = required_files
                        .into_iter()
                        .filter(|name| !self.file_store.exists(name))
                        .collect();
                    if !missing.is_empty() {
                        if !had_new_files {
                            self.set_last_error(FileTransferError::MissingFiles { names: missing }.to_string());
                            return;
                        }
                        self.files.set_missing_files(missing);
                        self.send_next_file_download_request();
                        return;
                    }

                    let Some(ghost_to) = self.ghost_to.as_mut() else {
                        return;
                    };
                    if let Some(SavedGhost::Object { index, object }) = ghost_to.pop_saved() {
                        ghost_to.install(index, object);
                    }
                    had_new_files = true;
                }
            }
        }
    }

    // File download

    pub(super) fn send_next_file_download_request(&mut self) {
        let request = self
            .files
            .next_request(self.file_store.as_ref(), self.config.never_download_files);
        match request {
            Some(names) => {
                info!("NetConnection: requesting files {:?}", names);
                self.post_internal(Box::new(FileDownloadRequestEvent::new(names)));
            }
            None => {
                let had_new_files = self.files.downloaded_count() != 0;
                self.load_next_ghost_always_object(had_new_files);
            }
        }
    }

    fn handle_file_download_request(&mut self, names: Vec<String>) {
        for name in names {
            let start = self.files.start_upload(
                &name,
                self.file_store.as_ref(),
                self.config.never_upload_files,
            );
            match start {
                UploadStart::Refused => break,
                UploadStart::Unavailable => {
                    info!("NetConnection: no such file {:?}", name);
                    self.post_internal(Box::new(FileChunkEvent::new(Vec::new())));
                }
                UploadStart::Started { size } => {
                    info!("NetConnection: sending file {:?} ({} bytes)", name, size);
                    self.send_connection_message(ConnectionMessage::FileDownloadSize, 0, size as u32);
                    for _ in 0..FILE_CHUNKS_IN_FLIGHT {
                        self.send_file_chunk();
                    }
                    return;
                }
            }
        }
        self.send_connection_message(ConnectionMessage::SendNextDownloadRequest, 0, 0);
    }

    pub(super) fn send_file_chunk(&mut self) {
        if let Some(chunk) = self.files.next_chunk() {
            self.post_internal(Box::new(FileChunkEvent::new(chunk)));
        }
    }

    fn handle_file_chunk(&mut self, data: &[u8]) {
        match self.files.chunk_received(data, self.file_store.as_mut()) {
            Ok(ChunkOutcome::Skipped) => {}
            Ok(ChunkOutcome::Progress { name, received, size }) => {
                self.handler.on_file_chunk_received(&name, received, size);
            }
            Ok(ChunkOutcome::Completed { name }) => {
                info!("NetConnection: saved file {:?}", name);
                self.send_next_file_download_request();
            }
            Err(error) => self.set_last_error(error.to_string()),
        }
    }
}

use crate::agent_mgr::AgentManager;
use crate::audit::AuditLog;
use crate::checks::{CheckContext, CheckRequestManager};
use crate::link::{LinkId, LinkKind, Outbox};
use crate::monitor_mgr::MonitorManager;
use slog::{debug, error, o, warn, Logger};
use warden_core::types::ROOT_BUCKET;
use warden_core::{ApiCode, BucketId, PolicyKey, PolicyResult, PolicyType};
use warden_plugin::{CheckOutcome, PluginRegistry, ServicePlugin};
use warden_storage::{Storage, StorageError};
use warden_wire::dialect::{admin as admin_codec, agent as agent_codec, client as client_codec};
use warden_wire::messages::{
    AdminOp, AdminReply, AdminRequest, AdminResponse, AgentAction, AgentOp, AgentReply,
    AgentRequest, AgentResponse, ClientOp, ClientReply, ClientRequest, ClientResponse, MonitorOp,
    MonitorRequest, WireCode,
};

fn root() -> BucketId {
    BucketId::from(ROOT_BUCKET)
}

fn wire_code(err: &StorageError) -> WireCode {
    match err {
        StorageError::BucketNotFound(_) => WireCode::BucketNotFound,
        StorageError::DefaultBucketDeletion | StorageError::DefaultBucketSetNone => {
            WireCode::OperationNotAllowed
        }
        StorageError::InvalidPolicyType(_) => WireCode::OperationFailed,
        StorageError::RecordCorrupted { .. }
        | StorageError::ChecksumMismatch(_)
        | StorageError::DatabaseCorrupted(_) => WireCode::DatabaseCorrupted,
        StorageError::LockUnavailable | StorageError::Io(_) => WireCode::OperationFailed,
    }
}

/// Routes every decoded request to storage, plugins, agents or the monitor
/// pipeline, and emits the responses (always under the requester's original
/// sequence number) into the outbox.
pub struct Dispatcher {
    storage: Storage,
    plugins: PluginRegistry<dyn ServicePlugin>,
    agents: AgentManager,
    checks: CheckRequestManager,
    monitor: MonitorManager,
    audit: AuditLog,
    log: Logger,
}

impl Dispatcher {
    pub fn new(
        storage: Storage,
        plugins: PluginRegistry<dyn ServicePlugin>,
        audit: AuditLog,
        log: &Logger,
    ) -> Dispatcher {
        let log = log.new(o!("module" => "dispatcher"));

        Dispatcher {
            storage,
            plugins,
            agents: AgentManager::new(&log),
            checks: CheckRequestManager::new(),
            monitor: MonitorManager::new(&log),
            audit,
            log,
        }
    }

    pub fn handle_client(&mut self, link: LinkId, request: ClientRequest, out: &mut Outbox) {
        match request.op {
            ClientOp::Check(key) => self.client_check(link, request.seq, key, out),
            ClientOp::SimpleCheck(key) => self.simple_check(link, request.seq, key, out),
            ClientOp::Cancel => self.cancel(link, request.seq, out),
            ClientOp::MonitorEntriesPut(entries) => self.monitor.absorb(entries, out),
        }
    }

    fn client_check(&mut self, link: LinkId, seq: u16, key: PolicyKey, out: &mut Outbox) {
        let result = match self.storage.check_policy(&key, &root(), true) {
            Ok(result) => result,
            Err(err) => {
                warn!(self.log, "check failed in storage"; "error" => ?err);
                self.finish_check(link, seq, &key, PolicyResult::from(PolicyType::DENY), out);
                return;
            }
        };

        if result.policy_type().is_plugin_defined() {
            self.plugin_check(link, seq, key, result, out);
        } else {
            self.finish_check(link, seq, &key, result, out);
        }
    }

    fn plugin_check(
        &mut self,
        link: LinkId,
        seq: u16,
        key: PolicyKey,
        stored: PolicyResult,
        out: &mut Outbox,
    ) {
        let policy_type = stored.policy_type();

        let plugin = match self.plugins.get(policy_type) {
            Some(plugin) => plugin,
            None => {
                // No handler for the type: the resolver fallback is DENY.
                warn!(self.log, "no plugin for policy type"; "type" => %policy_type);
                self.finish_check(link, seq, &key, PolicyResult::from(PolicyType::DENY), out);
                return;
            }
        };

        let outcome = plugin.borrow_mut().check(&key);

        match outcome {
            Ok(CheckOutcome::Ready(result)) => self.finish_check(link, seq, &key, result, out),
            Ok(CheckOutcome::NotReady { agent_type, data }) => {
                self.delegate(link, seq, key, policy_type, &agent_type, data, out)
            }
            Err(_) => {
                error!(self.log, "plugin check failed"; "type" => %policy_type);
                self.finish_check(link, seq, &key, PolicyResult::from(PolicyType::DENY), out);
            }
        }
    }

    /// Suspend the check: park a context and push the action to the agent.
    /// The requester gets nothing until the agent answers or goes away.
    fn delegate(
        &mut self,
        link: LinkId,
        seq: u16,
        key: PolicyKey,
        policy_type: PolicyType,
        agent_type: &str,
        data: String,
        out: &mut Outbox,
    ) {
        let agent_link = match self.agents.agent_link(agent_type) {
            Some(agent_link) => agent_link,
            None => {
                warn!(self.log, "required agent not registered"; "agent_type" => agent_type);
                self.finish_check(link, seq, &key, PolicyResult::from(PolicyType::DENY), out);
                return;
            }
        };

        let check_id = match self.agents.allocate_check_id(agent_link) {
            Some(check_id) => check_id,
            None => {
                warn!(self.log, "agent has no free check ids"; "agent_type" => agent_type);
                self.finish_check(link, seq, &key, PolicyResult::from(PolicyType::DENY), out);
                return;
            }
        };

        let created = self.checks.create(CheckContext {
            requester: link,
            requester_seq: seq,
            key: key.clone(),
            policy_type,
            agent_link,
            check_id,
        });

        if !created {
            // Second check under an in-flight sequence number; replies
            // would be ambiguous.
            warn!(self.log, "duplicate in-flight sequence number";
                  "link" => link, "seq" => seq);
            self.agents.release_check_id(agent_link, check_id);
            self.finish_check(link, seq, &key, PolicyResult::from(PolicyType::DENY), out);
            return;
        }

        debug!(self.log, "check delegated";
               "agent_type" => agent_type, "check_id" => check_id, "requester_seq" => seq);

        out.push(
            agent_link,
            agent_codec::encode_response(&AgentResponse {
                seq: check_id,
                reply: AgentReply::Action {
                    action: AgentAction::Action,
                    data,
                },
            }),
        );
    }

    fn simple_check(&mut self, link: LinkId, seq: u16, key: PolicyKey, out: &mut Outbox) {
        let stored = match self.storage.check_policy(&key, &root(), true) {
            Ok(result) => result,
            Err(_) => PolicyResult::from(PolicyType::DENY),
        };

        let reply = if stored.policy_type().is_plugin_defined() {
            match self.plugins.get(stored.policy_type()) {
                Some(plugin) => match plugin.borrow_mut().check(&key) {
                    Ok(CheckOutcome::Ready(result)) => {
                        self.audit.log(&key, &result);
                        self.monitor.record(&key, &result, out);
                        ClientReply::SimpleCheck {
                            code: ApiCode::Success.as_raw(),
                            result,
                        }
                    }
                    // An agent would be needed; a simple check never waits.
                    Ok(CheckOutcome::NotReady { .. }) => ClientReply::SimpleCheck {
                        code: ApiCode::AccessNotResolved.as_raw(),
                        result: PolicyResult::from(PolicyType::NONE),
                    },
                    Err(_) => ClientReply::SimpleCheck {
                        code: ApiCode::Success.as_raw(),
                        result: PolicyResult::from(PolicyType::DENY),
                    },
                },
                None => ClientReply::SimpleCheck {
                    code: ApiCode::Success.as_raw(),
                    result: PolicyResult::from(PolicyType::DENY),
                },
            }
        } else {
            self.audit.log(&key, &stored);
            self.monitor.record(&key, &stored, out);
            ClientReply::SimpleCheck {
                code: ApiCode::Success.as_raw(),
                result: stored,
            }
        };

        out.push(link, client_codec::encode_response(&ClientResponse { seq, reply }));
    }

    fn cancel(&mut self, link: LinkId, seq: u16, out: &mut Outbox) {
        if let Some(context) = self.checks.take_by_requester(link, seq) {
            debug!(self.log, "check cancelled by requester";
                   "seq" => seq, "check_id" => context.check_id);
            self.agents
                .release_check_id(context.agent_link, context.check_id);
            out.push(
                context.agent_link,
                agent_codec::encode_response(&AgentResponse {
                    seq: context.check_id,
                    reply: AgentReply::Action {
                        action: AgentAction::Cancel,
                        data: String::new(),
                    },
                }),
            );
        }

        out.push(
            link,
            client_codec::encode_response(&ClientResponse {
                seq,
                reply: ClientReply::Cancel,
            }),
        );
    }

    /// Common tail of every resolved check: audit, monitor entry, response.
    fn finish_check(
        &mut self,
        link: LinkId,
        seq: u16,
        key: &PolicyKey,
        result: PolicyResult,
        out: &mut Outbox,
    ) {
        self.audit.log(key, &result);
        self.monitor.record(key, &result, out);

        out.push(
            link,
            client_codec::encode_response(&ClientResponse {
                seq,
                reply: ClientReply::Check(result),
            }),
        );
    }

    pub fn handle_admin(&mut self, link: LinkId, request: AdminRequest, out: &mut Outbox) {
        let seq = request.seq;

        let reply = match request.op {
            AdminOp::Check {
                key,
                start_bucket,
                recursive,
            } => match self.storage.check_policy(&key, &start_bucket, recursive) {
                Ok(result) => AdminReply::Check(result),
                Err(err) => AdminReply::Code(wire_code(&err)),
            },
            AdminOp::SetBucket { bucket, default } => {
                AdminReply::Code(self.set_bucket(bucket, default))
            }
            AdminOp::RemoveBucket { bucket } => {
                AdminReply::Code(self.mutate(|storage| storage.remove_bucket(&bucket)))
            }
            AdminOp::SetPolicies {
                insert_or_update,
                remove,
            } => AdminReply::Code(self.set_policies(insert_or_update, remove)),
            AdminOp::List { bucket, filter } => match self.storage.list_policies(&bucket, &filter)
            {
                Ok(policies) => AdminReply::List {
                    policies,
                    bucket_valid: true,
                },
                Err(StorageError::BucketNotFound(_)) => AdminReply::List {
                    policies: Vec::new(),
                    bucket_valid: false,
                },
                Err(err) => AdminReply::Code(wire_code(&err)),
            },
            AdminOp::Erase {
                start_bucket,
                recursive,
                filter,
            } => AdminReply::Code(
                self.mutate(|storage| storage.erase_policies(&start_bucket, recursive, &filter)),
            ),
            AdminOp::ListDescriptions => AdminReply::Descriptions(self.descriptions()),
        };

        out.push(link, admin_codec::encode_response(&AdminResponse { seq, reply }));
    }

    /// Apply a storage mutation; on success refresh the on-disk copy.
    fn mutate<F>(&mut self, operation: F) -> WireCode
    where
        F: FnOnce(&mut Storage) -> Result<(), StorageError>,
    {
        if let Err(err) = operation(&mut self.storage) {
            debug!(self.log, "admin operation refused"; "error" => ?err);
            return wire_code(&err);
        }

        match self.storage.save() {
            Ok(()) => WireCode::Success,
            Err(err) => {
                error!(self.log, "database save failed"; "error" => ?err);
                wire_code(&err)
            }
        }
    }

    fn set_bucket(&mut self, bucket: BucketId, default: PolicyResult) -> WireCode {
        if default.policy_type().is_plugin_defined()
            && !self.plugins.is_registered(default.policy_type())
        {
            warn!(self.log, "bucket default uses unregistered policy type";
                  "type" => %default.policy_type());
            return WireCode::OperationFailed;
        }

        self.mutate(|storage| storage.insert_or_update_bucket(bucket, default))
    }

    fn set_policies(
        &mut self,
        insert_or_update: Vec<(BucketId, Vec<warden_core::Policy>)>,
        remove: Vec<(BucketId, Vec<PolicyKey>)>,
    ) -> WireCode {
        for (_, policies) in &insert_or_update {
            for policy in policies {
                let policy_type = policy.result.policy_type();
                if policy_type.is_plugin_defined() && !self.plugins.is_registered(policy_type) {
                    warn!(self.log, "policy uses unregistered policy type";
                          "type" => %policy_type);
                    return WireCode::OperationFailed;
                }
            }
        }

        self.mutate(|storage| storage.set_policies(&insert_or_update, &remove))
    }

    fn descriptions(&self) -> Vec<(u16, String)> {
        let mut descriptions = vec![
            (PolicyType::DENY.0, "DENY".to_string()),
            (PolicyType::NONE.0, "NONE".to_string()),
            (PolicyType::ALLOW.0, "ALLOW".to_string()),
            (PolicyType::BUCKET.0, "BUCKET".to_string()),
        ];

        for description in self.plugins.descriptions() {
            descriptions.push((description.policy_type.0, description.name));
        }

        descriptions
    }

    pub fn handle_agent(&mut self, link: LinkId, request: AgentRequest, out: &mut Outbox) {
        match request.op {
            AgentOp::Register { agent_type } => {
                let code = self.agents.register(&agent_type, link);
                out.push(
                    link,
                    agent_codec::encode_response(&AgentResponse {
                        seq: request.seq,
                        reply: AgentReply::Register(code),
                    }),
                );
            }
            AgentOp::Action { action, data } => match action {
                AgentAction::Action => self.agent_update(link, request.seq, data, out),
                AgentAction::Cancel => {
                    // The agent gave up on the check; the requester learns
                    // nothing beyond a denial.
                    if let Some(context) = self.checks.take_by_agent(link, request.seq) {
                        self.agents.release_check_id(link, context.check_id);
                        self.finish_check(
                            context.requester,
                            context.requester_seq,
                            &context.key,
                            PolicyResult::from(PolicyType::DENY),
                            out,
                        );
                    }
                }
            },
        }
    }

    /// An agent answered: resume the parked check, feed the plugin and
    /// reply to the original requester under its original sequence number.
    fn agent_update(&mut self, link: LinkId, check_id: u16, data: String, out: &mut Outbox) {
        let context = match self.checks.take_by_agent(link, check_id) {
            Some(context) => context,
            None => {
                debug!(self.log, "agent reply for unknown check"; "check_id" => check_id);
                return;
            }
        };

        self.agents.release_check_id(link, context.check_id);

        let result = match self.plugins.get(context.policy_type) {
            Some(plugin) => match plugin.borrow_mut().update(&context.key, &data) {
                Ok(result) => result,
                Err(_) => {
                    error!(self.log, "plugin update failed"; "type" => %context.policy_type);
                    PolicyResult::from(PolicyType::DENY)
                }
            },
            None => PolicyResult::from(PolicyType::DENY),
        };

        self.finish_check(
            context.requester,
            context.requester_seq,
            &context.key,
            result,
            out,
        );
    }

    pub fn handle_monitor(&mut self, link: LinkId, request: MonitorRequest, out: &mut Outbox) {
        match request.op {
            MonitorOp::GetEntries { capacity } => {
                self.monitor.subscribe(link, request.seq, capacity, out)
            }
            MonitorOp::Flush => self.monitor.flush(out),
        }
    }

    /// A connection went away; unwind whatever referenced it.
    pub fn on_disconnect(&mut self, link: LinkId, kind: LinkKind, out: &mut Outbox) {
        match kind {
            LinkKind::Client => {
                for context in self.checks.drain_requester(link) {
                    debug!(self.log, "requester gone, cancelling delegated check";
                           "check_id" => context.check_id);
                    self.agents
                        .release_check_id(context.agent_link, context.check_id);
                    out.push(
                        context.agent_link,
                        agent_codec::encode_response(&AgentResponse {
                            seq: context.check_id,
                            reply: AgentReply::Action {
                                action: AgentAction::Cancel,
                                data: String::new(),
                            },
                        }),
                    );
                }
            }
            LinkKind::Agent => {
                self.agents.unregister(link);
                for context in self.checks.drain_agent(link) {
                    debug!(self.log, "agent gone, denying delegated check";
                           "check_id" => context.check_id);
                    self.finish_check(
                        context.requester,
                        context.requester_seq,
                        &context.key,
                        PolicyResult::from(PolicyType::DENY),
                        out,
                    );
                }
            }
            LinkKind::Monitor => self.monitor.unsubscribe(link),
            LinkKind::Admin => {}
        }
    }

    /// Periodic work between poll wakeups.
    pub fn tick(&mut self, out: &mut Outbox) {
        self.monitor.tick(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use warden_core::audit::AuditLevel;
    use warden_core::{logging, Policy};
    use warden_plugin::{PluginError, PolicyDescription};
    use warden_storage::backend::Database;
    use warden_wire::BinaryQueue;

    const ASK_TYPE: PolicyType = PolicyType(100);

    const CLIENT_LINK: LinkId = 1;
    const AGENT_LINK: LinkId = 9;

    /// Plugin that always wants the "a.test" agent and maps the agent's
    /// reply "yes" to ALLOW.
    struct AskAgentPlugin;

    impl ServicePlugin for AskAgentPlugin {
        fn supported_descriptions(&self) -> Vec<PolicyDescription> {
            vec![PolicyDescription {
                policy_type: ASK_TYPE,
                name: "ask".to_string(),
            }]
        }

        fn check(&mut self, _key: &PolicyKey) -> Result<CheckOutcome, PluginError> {
            Ok(CheckOutcome::NotReady {
                agent_type: "a.test".to_string(),
                data: "question".to_string(),
            })
        }

        fn update(&mut self, _key: &PolicyKey, data: &str) -> Result<PolicyResult, PluginError> {
            Ok(if data == "yes" {
                PolicyResult::from(PolicyType::ALLOW)
            } else {
                PolicyResult::from(PolicyType::DENY)
            })
        }

        fn invalidate(&mut self) {}
    }

    struct Fixture {
        dispatcher: Dispatcher,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let log = logging::discard();

        let storage = Storage::new(Database::new(dir.path().join("db"), &log));

        let mut plugins: PluginRegistry<dyn ServicePlugin> = PluginRegistry::new(log.clone());
        let plugin: Rc<RefCell<Box<dyn ServicePlugin>>> =
            Rc::new(RefCell::new(Box::new(AskAgentPlugin)));
        plugins.register(plugin.borrow().supported_descriptions(), plugin.clone());

        let audit = AuditLog::with_level(AuditLevel::None, &log);

        Fixture {
            dispatcher: Dispatcher::new(storage, plugins, audit, &log),
            _dir: dir,
        }
    }

    fn key() -> PolicyKey {
        PolicyKey::new("c", "u", "p")
    }

    fn client_frames(out: &mut Outbox, link: LinkId) -> Vec<ClientResponse> {
        decode(out, link, |queue| {
            client_codec::extract_response(queue).unwrap()
        })
    }

    fn agent_frames(out: &mut Outbox, link: LinkId) -> Vec<AgentResponse> {
        decode(out, link, |queue| {
            agent_codec::extract_response(queue).unwrap()
        })
    }

    fn decode<T, F: Fn(&mut BinaryQueue) -> Option<T>>(
        out: &mut Outbox,
        link: LinkId,
        extract: F,
    ) -> Vec<T> {
        let mut queue = BinaryQueue::new();
        for (target, frame) in out.take_frames() {
            if target == link {
                queue.append(&frame);
            }
        }

        let mut messages = Vec::new();
        while let Some(message) = extract(&mut queue) {
            messages.push(message);
        }
        messages
    }

    fn install_policy(fixture: &mut Fixture, result: PolicyResult) {
        fixture
            .dispatcher
            .storage
            .set_policies(&[(root(), vec![Policy::new(key(), result)])], &[])
            .unwrap();
    }

    fn register_agent(fixture: &mut Fixture) {
        let mut out = Outbox::new();
        fixture.dispatcher.handle_agent(
            AGENT_LINK,
            AgentRequest {
                seq: 0,
                op: AgentOp::Register {
                    agent_type: "a.test".to_string(),
                },
            },
            &mut out,
        );

        let replies = agent_frames(&mut out, AGENT_LINK);
        assert_eq!(replies[0].reply, AgentReply::Register(WireCode::Success));
    }

    fn send_check(fixture: &mut Fixture, seq: u16) -> Outbox {
        let mut out = Outbox::new();
        fixture.dispatcher.handle_client(
            CLIENT_LINK,
            ClientRequest {
                seq,
                op: ClientOp::Check(key()),
            },
            &mut out,
        );
        out
    }

    #[test]
    fn test_empty_root_denies() {
        let mut fixture = fixture();

        let mut out = send_check(&mut fixture, 7);

        let replies = client_frames(&mut out, CLIENT_LINK);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].seq, 7);
        assert_eq!(
            replies[0].reply,
            ClientReply::Check(PolicyResult::from(PolicyType::DENY))
        );
    }

    #[test]
    fn test_stored_allow_is_returned() {
        let mut fixture = fixture();
        install_policy(&mut fixture, PolicyResult::from(PolicyType::ALLOW));

        let mut out = send_check(&mut fixture, 8);

        let replies = client_frames(&mut out, CLIENT_LINK);
        assert_eq!(
            replies[0].reply,
            ClientReply::Check(PolicyResult::from(PolicyType::ALLOW))
        );
    }

    #[test]
    fn test_plugin_type_without_plugin_denies() {
        let mut fixture = fixture();
        install_policy(&mut fixture, PolicyResult::new(PolicyType(200), ""));

        let mut out = send_check(&mut fixture, 9);

        let replies = client_frames(&mut out, CLIENT_LINK);
        assert_eq!(
            replies[0].reply,
            ClientReply::Check(PolicyResult::from(PolicyType::DENY))
        );
    }

    #[test]
    fn test_delegated_check_round_trip() {
        let mut fixture = fixture();
        install_policy(&mut fixture, PolicyResult::from(ASK_TYPE));
        register_agent(&mut fixture);

        // The requester gets no reply yet; the agent gets the action.
        let mut out = send_check(&mut fixture, 42);
        assert!(client_frames(&mut out, CLIENT_LINK).is_empty());

        let mut out = send_check(&mut fixture, 42);
        // Same seq again while in flight: answered with a denial.
        let replies = client_frames(&mut out, CLIENT_LINK);
        assert_eq!(
            replies[0].reply,
            ClientReply::Check(PolicyResult::from(PolicyType::DENY))
        );

        let mut out = send_check(&mut fixture, 43);
        let pushed = agent_frames(&mut out, AGENT_LINK);
        assert_eq!(pushed.len(), 1);
        let check_id = pushed[0].seq;
        assert_eq!(
            pushed[0].reply,
            AgentReply::Action {
                action: AgentAction::Action,
                data: "question".to_string(),
            }
        );

        // The agent answers under the check id; the requester sees its own
        // sequence number come back.
        let mut out = Outbox::new();
        fixture.dispatcher.handle_agent(
            AGENT_LINK,
            AgentRequest {
                seq: check_id,
                op: AgentOp::Action {
                    action: AgentAction::Action,
                    data: "yes".to_string(),
                },
            },
            &mut out,
        );

        let replies = client_frames(&mut out, CLIENT_LINK);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].seq, 43);
        assert_eq!(
            replies[0].reply,
            ClientReply::Check(PolicyResult::from(PolicyType::ALLOW))
        );
    }

    #[test]
    fn test_requester_disconnect_cancels_agent_work() {
        let mut fixture = fixture();
        install_policy(&mut fixture, PolicyResult::from(ASK_TYPE));
        register_agent(&mut fixture);

        let mut out = send_check(&mut fixture, 42);
        let check_id = agent_frames(&mut out, AGENT_LINK)[0].seq;

        let mut out = Outbox::new();
        fixture
            .dispatcher
            .on_disconnect(CLIENT_LINK, LinkKind::Client, &mut out);

        let pushed = agent_frames(&mut out, AGENT_LINK);
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].seq, check_id);
        assert_eq!(
            pushed[0].reply,
            AgentReply::Action {
                action: AgentAction::Cancel,
                data: String::new(),
            }
        );
    }

    #[test]
    fn test_cancel_request_notifies_agent_and_acknowledges() {
        let mut fixture = fixture();
        install_policy(&mut fixture, PolicyResult::from(ASK_TYPE));
        register_agent(&mut fixture);

        let mut out = send_check(&mut fixture, 42);
        let check_id = agent_frames(&mut out, AGENT_LINK)[0].seq;

        let mut out = Outbox::new();
        fixture.dispatcher.handle_client(
            CLIENT_LINK,
            ClientRequest {
                seq: 42,
                op: ClientOp::Cancel,
            },
            &mut out,
        );

        let pushed = agent_frames(&mut out, AGENT_LINK);
        assert_eq!(pushed[0].seq, check_id);
        assert_eq!(
            pushed[0].reply,
            AgentReply::Action {
                action: AgentAction::Cancel,
                data: String::new(),
            }
        );

        let replies = client_frames(&mut out, CLIENT_LINK);
        assert_eq!(replies[0].seq, 42);
        assert_eq!(replies[0].reply, ClientReply::Cancel);

        // A late agent answer is dropped on the floor.
        let mut out = Outbox::new();
        fixture.dispatcher.handle_agent(
            AGENT_LINK,
            AgentRequest {
                seq: check_id,
                op: AgentOp::Action {
                    action: AgentAction::Action,
                    data: "yes".to_string(),
                },
            },
            &mut out,
        );
        assert!(client_frames(&mut out, CLIENT_LINK).is_empty());
    }

    #[test]
    fn test_agent_disconnect_denies_waiting_checks() {
        let mut fixture = fixture();
        install_policy(&mut fixture, PolicyResult::from(ASK_TYPE));
        register_agent(&mut fixture);

        send_check(&mut fixture, 42);

        let mut out = Outbox::new();
        fixture
            .dispatcher
            .on_disconnect(AGENT_LINK, LinkKind::Agent, &mut out);

        let replies = client_frames(&mut out, CLIENT_LINK);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].seq, 42);
        assert_eq!(
            replies[0].reply,
            ClientReply::Check(PolicyResult::from(PolicyType::DENY))
        );

        // The type is free for a new agent again.
        register_agent(&mut fixture);
    }

    #[test]
    fn test_missing_agent_denies_immediately() {
        let mut fixture = fixture();
        install_policy(&mut fixture, PolicyResult::from(ASK_TYPE));

        let mut out = send_check(&mut fixture, 42);

        let replies = client_frames(&mut out, CLIENT_LINK);
        assert_eq!(
            replies[0].reply,
            ClientReply::Check(PolicyResult::from(PolicyType::DENY))
        );
    }

    #[test]
    fn test_admin_mutations_are_visible_to_checks() {
        let mut fixture = fixture();

        let mut out = Outbox::new();
        fixture.dispatcher.handle_admin(
            2,
            AdminRequest {
                seq: 1,
                op: AdminOp::SetBucket {
                    bucket: BucketId::from("extra"),
                    default: PolicyResult::from(PolicyType::ALLOW),
                },
            },
            &mut out,
        );
        fixture.dispatcher.handle_admin(
            2,
            AdminRequest {
                seq: 2,
                op: AdminOp::SetPolicies {
                    insert_or_update: vec![(
                        root(),
                        vec![Policy::new(
                            key(),
                            PolicyResult::new(PolicyType::BUCKET, "extra"),
                        )],
                    )],
                    remove: vec![],
                },
            },
            &mut out,
        );

        let replies = decode(&mut out, 2, |queue| {
            admin_codec::extract_response(queue).unwrap()
        });
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].reply, AdminReply::Code(WireCode::Success));
        assert_eq!(replies[1].reply, AdminReply::Code(WireCode::Success));

        let mut out = send_check(&mut fixture, 5);
        let replies = client_frames(&mut out, CLIENT_LINK);
        assert_eq!(
            replies[0].reply,
            ClientReply::Check(PolicyResult::from(PolicyType::ALLOW))
        );
    }

    #[test]
    fn test_admin_rejects_unregistered_plugin_type() {
        let mut fixture = fixture();

        let mut out = Outbox::new();
        fixture.dispatcher.handle_admin(
            2,
            AdminRequest {
                seq: 1,
                op: AdminOp::SetPolicies {
                    insert_or_update: vec![(
                        root(),
                        vec![Policy::new(key(), PolicyResult::new(PolicyType(333), ""))],
                    )],
                    remove: vec![],
                },
            },
            &mut out,
        );

        let replies = decode(&mut out, 2, |queue| {
            admin_codec::extract_response(queue).unwrap()
        });
        assert_eq!(replies[0].reply, AdminReply::Code(WireCode::OperationFailed));
    }

    #[test]
    fn test_descriptions_cover_predefined_and_plugins() {
        let fixture = fixture();

        let descriptions = fixture.dispatcher.descriptions();

        assert!(descriptions.contains(&(PolicyType::DENY.0, "DENY".to_string())));
        assert!(descriptions.contains(&(ASK_TYPE.0, "ask".to_string())));
    }
}

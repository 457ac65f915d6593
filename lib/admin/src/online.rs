use crate::logic::AdminApi;
use slog::{debug, Logger};
use std::io;
use std::path::Path;
use warden_core::{ApiCode, BucketId, Policy, PolicyKey, PolicyResult};
use warden_wire::dialect::admin as codec;
use warden_wire::messages::{AdminOp, AdminReply, AdminRequest, AdminResponse, WireCode};
use warden_wire::transport::SocketClient;

fn code_from_wire(code: WireCode) -> ApiCode {
    match code {
        WireCode::Success => ApiCode::Success,
        WireCode::OperationNotAllowed => ApiCode::OperationNotAllowed,
        WireCode::OperationFailed => ApiCode::OperationFailed,
        WireCode::BucketNotFound => ApiCode::BucketNotFound,
        WireCode::NoPolicy => ApiCode::Success,
        WireCode::Rejected => ApiCode::OperationFailed,
        WireCode::DatabaseCorrupted => ApiCode::DatabaseCorrupted,
    }
}

/// Admin operations over the admin socket of a running service.
pub struct OnlineAdmin {
    socket: SocketClient,
    sequence: u16,
    log: Logger,
}

impl OnlineAdmin {
    pub fn connect(path: &Path, log: &Logger) -> io::Result<OnlineAdmin> {
        let mut socket = SocketClient::new(path);
        socket.connect()?;

        Ok(OnlineAdmin {
            socket,
            sequence: 0,
            log: log.clone(),
        })
    }

    fn round_trip(&mut self, op: AdminOp) -> Result<AdminReply, ApiCode> {
        self.sequence = self.sequence.wrapping_add(1);
        let request = AdminRequest {
            seq: self.sequence,
            op,
        };

        self.socket
            .send(&codec::encode_request(&request))
            .map_err(|_| ApiCode::ServiceNotAvailable)?;

        let expected = self.sequence;
        loop {
            let response: AdminResponse = self
                .socket
                .receive(|queue| {
                    codec::extract_response(queue)
                        .map_err(|_| io::Error::from(io::ErrorKind::InvalidData))
                })
                .map_err(|_| ApiCode::ServiceNotAvailable)?;

            if response.seq == expected {
                return Ok(response.reply);
            }
            debug!(self.log, "dropping stray admin response"; "seq" => response.seq);
        }
    }

    fn expect_code(&mut self, op: AdminOp) -> ApiCode {
        match self.round_trip(op) {
            Ok(AdminReply::Code(code)) => code_from_wire(code),
            Ok(_) => ApiCode::UnknownError,
            Err(code) => code,
        }
    }
}

impl AdminApi for OnlineAdmin {
    fn set_bucket(&mut self, bucket: &BucketId, default: PolicyResult) -> ApiCode {
        self.expect_code(AdminOp::SetBucket {
            bucket: bucket.clone(),
            default,
        })
    }

    fn remove_bucket(&mut self, bucket: &BucketId) -> ApiCode {
        self.expect_code(AdminOp::RemoveBucket {
            bucket: bucket.clone(),
        })
    }

    fn set_policies(
        &mut self,
        insert_or_update: Vec<(BucketId, Vec<Policy>)>,
        remove: Vec<(BucketId, Vec<PolicyKey>)>,
    ) -> ApiCode {
        self.expect_code(AdminOp::SetPolicies {
            insert_or_update,
            remove,
        })
    }

    fn check(
        &mut self,
        key: &PolicyKey,
        start_bucket: &BucketId,
        recursive: bool,
    ) -> Result<PolicyResult, ApiCode> {
        match self.round_trip(AdminOp::Check {
            key: key.clone(),
            start_bucket: start_bucket.clone(),
            recursive,
        }) {
            Ok(AdminReply::Check(result)) => Ok(result),
            Ok(AdminReply::Code(code)) => Err(code_from_wire(code)),
            Ok(_) => Err(ApiCode::UnknownError),
            Err(code) => Err(code),
        }
    }

    fn list(
        &mut self,
        bucket: &BucketId,
        filter: &PolicyKey,
    ) -> Result<Vec<Policy>, ApiCode> {
        match self.round_trip(AdminOp::List {
            bucket: bucket.clone(),
            filter: filter.clone(),
        }) {
            Ok(AdminReply::List {
                policies,
                bucket_valid,
            }) => {
                if bucket_valid {
                    Ok(policies)
                } else {
                    Err(ApiCode::BucketNotFound)
                }
            }
            Ok(AdminReply::Code(code)) => Err(code_from_wire(code)),
            Ok(_) => Err(ApiCode::UnknownError),
            Err(code) => Err(code),
        }
    }

    fn erase(&mut self, start_bucket: &BucketId, recursive: bool, filter: &PolicyKey) -> ApiCode {
        self.expect_code(AdminOp::Erase {
            start_bucket: start_bucket.clone(),
            recursive,
            filter: filter.clone(),
        })
    }

    fn descriptions(&mut self) -> Result<Vec<(u16, String)>, ApiCode> {
        match self.round_trip(AdminOp::ListDescriptions) {
            Ok(AdminReply::Descriptions(descriptions)) => Ok(descriptions),
            Ok(AdminReply::Code(code)) => Err(code_from_wire(code)),
            Ok(_) => Err(ApiCode::UnknownError),
            Err(code) => Err(code),
        }
    }
}

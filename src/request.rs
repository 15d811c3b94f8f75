use std::collections::VecDeque;

use crate::codec::{self, WireKind, WireValue};
use crate::commands::CommandSpec;
use crate::error::RobolinkError;
use crate::model::{Handle, JointVector, Matrix2D, Pose};
use crate::session::Session;
use crate::status::StatusCode;
use crate::transport::{self, Transport};

/// A command name, its ordered arguments and the return shape the caller expects.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    name: String,
    args: Vec<WireValue>,
    returns: Vec<WireKind>,
    spec: Option<&'static CommandSpec>,
}

impl Request {
    /// Free-form request with no return values until [`Request::returns`] says otherwise.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            returns: Vec::new(),
            spec: None,
        }
    }

    /// Request checked against a catalog shape before anything is written.
    pub fn for_command(spec: &'static CommandSpec) -> Self {
        Self {
            name: spec.name.to_string(),
            args: Vec::with_capacity(spec.args.len()),
            returns: spec.returns.to_vec(),
            spec: Some(spec),
        }
    }

    pub fn arg(mut self, value: impl Into<WireValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn returns(mut self, kinds: &[WireKind]) -> Self {
        self.returns = kinds.to_vec();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[WireValue] {
        &self.args
    }

    pub fn expected_returns(&self) -> &[WireKind] {
        &self.returns
    }

    pub fn is_blocking(&self) -> bool {
        self.spec.is_some_and(|spec| spec.blocking)
    }

    /// Name line followed by every argument, ready to write in one go.
    pub fn encode(&self) -> Result<Vec<u8>, RobolinkError> {
        self.validate()?;

        let mut bytes = Vec::new();
        codec::encode_line(&self.name, &mut bytes);
        for (index, value) in self.args.iter().enumerate() {
            warn_if_suspicious(&self.name, index, value);
            codec::encode(value, &mut bytes).map_err(|err| self.mismatch(err.to_string()))?;
        }
        Ok(bytes)
    }

    fn validate(&self) -> Result<(), RobolinkError> {
        if self.name.trim().is_empty() {
            return Err(self.mismatch("command name is empty".to_string()));
        }

        let Some(spec) = self.spec else {
            return Ok(());
        };

        if self.args.len() != spec.args.len() {
            return Err(self.mismatch(format!(
                "expected {} arguments, got {}",
                spec.args.len(),
                self.args.len()
            )));
        }

        for (index, (value, expected)) in self.args.iter().zip(spec.args).enumerate() {
            if value.kind() != *expected {
                return Err(self.mismatch(format!(
                    "argument {index} should be {expected}, got {}",
                    value.kind()
                )));
            }
        }

        Ok(())
    }

    fn mismatch(&self, reason: String) -> RobolinkError {
        RobolinkError::ArgumentMismatch {
            command: self.name.clone(),
            reason,
        }
    }
}

/// Values that encode fine but are probably not what the remote expects.
fn warn_if_suspicious(command: &str, index: usize, value: &WireValue) {
    match value {
        WireValue::Pose(pose) if !pose.is_homogeneous() => {
            warn!(command, argument = index, "pose argument is not a homogeneous transform");
        }
        WireValue::JointVector(joints) if !joints.fits_mechanism() => {
            warn!(
                command,
                argument = index,
                axes = joints.len(),
                "joint vector has more axes than any mechanism"
            );
        }
        _ => {}
    }
}

/// Status and return values of one completed request.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    command: String,
    status: StatusCode,
    warning: Option<String>,
    values: VecDeque<WireValue>,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Diagnostic text of a status-2 warning.
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<WireValue> {
        self.values.into()
    }

    pub fn take_int(&mut self) -> Result<i32, RobolinkError> {
        match self.take(WireKind::Int32)? {
            WireValue::Int32(value) => Ok(value),
            other => Err(self.wrong_kind(WireKind::Int32, other.kind())),
        }
    }

    pub fn take_handle(&mut self) -> Result<Handle, RobolinkError> {
        match self.take(WireKind::Handle)? {
            WireValue::Handle(value) => Ok(value),
            other => Err(self.wrong_kind(WireKind::Handle, other.kind())),
        }
    }

    pub fn take_pose(&mut self) -> Result<Pose, RobolinkError> {
        match self.take(WireKind::Pose)? {
            WireValue::Pose(value) => Ok(value),
            other => Err(self.wrong_kind(WireKind::Pose, other.kind())),
        }
    }

    pub fn take_joints(&mut self) -> Result<JointVector, RobolinkError> {
        match self.take(WireKind::JointVector)? {
            WireValue::JointVector(value) => Ok(value),
            other => Err(self.wrong_kind(WireKind::JointVector, other.kind())),
        }
    }

    pub fn take_matrix(&mut self) -> Result<Matrix2D, RobolinkError> {
        match self.take(WireKind::Matrix2D)? {
            WireValue::Matrix2D(value) => Ok(value),
            other => Err(self.wrong_kind(WireKind::Matrix2D, other.kind())),
        }
    }

    pub fn take_line(&mut self) -> Result<String, RobolinkError> {
        match self.take(WireKind::Line)? {
            WireValue::Line(value) => Ok(value),
            other => Err(self.wrong_kind(WireKind::Line, other.kind())),
        }
    }

    fn take(&mut self, expected: WireKind) -> Result<WireValue, RobolinkError> {
        self.values
            .pop_front()
            .ok_or_else(|| RobolinkError::ArgumentMismatch {
                command: self.command.clone(),
                reason: format!("no {expected} value left in response"),
            })
    }

    fn wrong_kind(&self, expected: WireKind, actual: WireKind) -> RobolinkError {
        RobolinkError::ArgumentMismatch {
            command: self.command.clone(),
            reason: format!("expected {expected} return value, got {actual}"),
        }
    }
}

/// Runs one request/response cycle over a session.
///
/// The engine holds the session exclusively for the whole cycle, so a second
/// request cannot start before the first one's status and return values are
/// read. A session-fatal error discards the session's socket before returning.
#[derive(Debug)]
pub struct RequestEngine<'s, T: Transport> {
    session: &'s mut Session<T>,
}

impl<'s, T: Transport> RequestEngine<'s, T> {
    pub fn new(session: &'s mut Session<T>) -> Self {
        Self { session }
    }

    pub fn session(&mut self) -> &mut Session<T> {
        self.session
    }

    pub fn call(&mut self, request: &Request) -> Result<Response, RobolinkError> {
        let bytes = request.encode()?;

        if let Err(err) = self.session.begin_request() {
            if matches!(err, RobolinkError::RequestInFlight) {
                self.session.discard();
            }
            return Err(err);
        }

        let result = exchange(self.session.transport_mut()?, request, &bytes);
        match &result {
            Err(err) if err.is_session_fatal() => self.session.discard(),
            _ => self.session.finish_request(),
        }
        result
    }
}

impl<T: Transport> Session<T> {
    pub fn call(&mut self, request: &Request) -> Result<Response, RobolinkError> {
        RequestEngine::new(self).call(request)
    }
}

fn exchange<T: Transport>(
    transport: &mut T,
    request: &Request,
    bytes: &[u8],
) -> Result<Response, RobolinkError> {
    debug!(command = request.name(), args = request.args().len(), "sending request");
    transport.send(bytes)?;

    let status = StatusCode::from_code(transport::read_int(transport)?);
    let message = if status.has_trailing_line() {
        Some(transport::read_line(transport)?)
    } else {
        None
    };

    if let Some(err) = status.into_error(message.clone()) {
        debug!(command = request.name(), status = %status, "request failed");
        return Err(err);
    }

    if let Some(message) = message.as_deref() {
        warn!(command = request.name(), message, "remote reported a warning");
    }

    let values = request
        .expected_returns()
        .iter()
        .map(|kind| transport::read_value(transport, *kind))
        .collect::<Result<VecDeque<_>, _>>()?;

    Ok(Response {
        command: request.name().to_string(),
        status,
        warning: message,
        values,
    })
}

//! Routes backend parser events into an [`Exchange`] and its [`Frontend`].

use tracing::{debug, trace, warn};

use crate::parser::{BodyDisposition, ParserEvents, ResponseHead};
use crate::proxy::headers::{FieldState, HeaderAccumulator};
use crate::proxy::{Exchange, Frontend, MessageState};
use crate::Result;

/// A key fragment either extends the key being built or starts the next pair.
pub(crate) fn header_field(headers: &mut HeaderAccumulator, data: &[u8]) {
    match headers.state() {
        FieldState::BuildingKey => headers.append_key(data),
        FieldState::BuildingValue => headers.add(data, Vec::new()),
    }
}

/// A value fragment either opens the value of the last pair or extends it.
pub(crate) fn header_value(headers: &mut HeaderAccumulator, data: &[u8]) {
    match headers.state() {
        FieldState::BuildingKey => headers.begin_value(data),
        FieldState::BuildingValue => headers.append_value(data),
    }
}

pub(crate) struct ResponseEvents<'a> {
    exchange: &'a mut Exchange,
    frontend: &'a mut dyn Frontend,
}

impl<'a> ResponseEvents<'a> {
    pub(crate) fn new(exchange: &'a mut Exchange, frontend: &'a mut dyn Frontend) -> Self {
        Self { exchange, frontend }
    }
}

impl ParserEvents for ResponseEvents<'_> {
    fn on_header_field(&mut self, data: &[u8]) -> Result<()> {
        header_field(&mut self.exchange.response.headers, data);
        Ok(())
    }

    fn on_header_value(&mut self, data: &[u8]) -> Result<()> {
        header_value(&mut self.exchange.response.headers, data);
        Ok(())
    }

    fn on_headers_complete(&mut self, head: &ResponseHead) -> Result<BodyDisposition> {
        let exchange = &mut *self.exchange;
        let response = &mut exchange.response;
        response.status = head.status;
        response.major = head.major;
        response.minor = head.minor;
        response.connection_close = !head.keep_alive;
        response.state.advance(MessageState::HeaderComplete)?;

        debug!(
            "Exchange {} got backend response {} HTTP/{}.{}",
            exchange.client_stream_id(),
            head.status,
            head.major,
            head.minor
        );

        if let Err(err) = self.frontend.on_header_complete(exchange) {
            warn!(
                "Exchange {} rejected by frontend on response headers: {}",
                exchange.client_stream_id(),
                err
            );
            return Err(err);
        }

        // HEAD responses and 1xx/204/304 may announce a body they never send.
        if exchange.response_body_suppressed() {
            Ok(BodyDisposition::Skip)
        } else {
            Ok(BodyDisposition::Read)
        }
    }

    fn on_body(&mut self, data: &[u8]) -> Result<()> {
        match self.frontend.on_body(self.exchange, data) {
            Ok(consumed) => {
                trace!(
                    "Exchange {} forwarded {} of {} body bytes",
                    self.exchange.client_stream_id(),
                    consumed,
                    data.len()
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "Exchange {} frontend failed on response body: {}",
                    self.exchange.client_stream_id(),
                    err
                );
                Err(err)
            }
        }
    }

    fn on_message_complete(&mut self) -> Result<()> {
        self.exchange
            .response
            .state
            .advance(MessageState::MsgComplete)?;
        self.frontend.on_body_complete(self.exchange)
    }
}

use crate::error::NegotiationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Stable,
    /// Remote offer applied, our answer not yet sent.
    AwaitingLocalAnswer,
    /// Local offer sent over the control channel, answer not yet applied.
    AwaitingRemoteAnswer,
    /// Renegotiation requested before the control channel became ready.
    RenegotiationPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NegotiationStep {
    Idle,
    SendOffer,
}

/// Что делать с входящим sdpOffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoteOffer {
    Answer,
    /// Our own offer was dropped in favour of the remote one and will be re-sent.
    AnswerAfterYield,
    /// Colliding offer; ours stays in flight.
    Ignore,
}

/// Машина состояний пересогласования одного PeerLink.
///
/// Чистая логика без I/O: задача ссылки вызывает методы в ответ на события
/// и выполняет возвращенный шаг. Одновременно в полете не более одного offer.
///
/// При встречных offer уступает «вежливая» сторона (offerer сессии).
#[derive(Debug)]
pub(crate) struct Negotiator {
    state: NegotiationState,
    ready: bool,
    queued: bool,
    polite: bool,
}

impl Negotiator {
    pub fn new(polite: bool) -> Self {
        Self {
            state: NegotiationState::Stable,
            ready: false,
            queued: false,
            polite,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Локальной стороне нужен новый offer (negotiation-needed или мутация до готовности).
    pub fn request(&mut self) -> NegotiationStep {
        match self.state {
            NegotiationState::Stable if self.ready => {
                self.state = NegotiationState::AwaitingRemoteAnswer;
                NegotiationStep::SendOffer
            }
            NegotiationState::Stable => {
                self.state = NegotiationState::RenegotiationPending;
                NegotiationStep::Idle
            }
            NegotiationState::RenegotiationPending => NegotiationStep::Idle,
            NegotiationState::AwaitingLocalAnswer | NegotiationState::AwaitingRemoteAnswer => {
                self.queued = true;
                NegotiationStep::Idle
            }
        }
    }

    /// Контрольный канал получил probe от удаленной стороны.
    pub fn mark_ready(&mut self) -> NegotiationStep {
        self.ready = true;
        if self.state == NegotiationState::RenegotiationPending {
            self.state = NegotiationState::Stable;
            return self.request();
        }
        NegotiationStep::Idle
    }

    pub fn begin_remote_offer(&mut self) -> Result<RemoteOffer, NegotiationError> {
        let action = match self.state {
            NegotiationState::Stable => RemoteOffer::Answer,
            NegotiationState::RenegotiationPending => {
                self.queued = true;
                RemoteOffer::Answer
            }
            NegotiationState::AwaitingRemoteAnswer if self.polite => {
                self.queued = true;
                RemoteOffer::AnswerAfterYield
            }
            NegotiationState::AwaitingRemoteAnswer => return Ok(RemoteOffer::Ignore),
            NegotiationState::AwaitingLocalAnswer => {
                return Err(NegotiationError::OutOfOrder {
                    received: "sdpOffer",
                    state: self.state,
                });
            }
        };
        self.state = NegotiationState::AwaitingLocalAnswer;
        Ok(action)
    }

    pub fn finish_local_answer(&mut self) -> NegotiationStep {
        self.state = NegotiationState::Stable;
        self.resume()
    }

    pub fn begin_remote_answer(&self) -> Result<(), NegotiationError> {
        if self.state != NegotiationState::AwaitingRemoteAnswer {
            return Err(NegotiationError::OutOfOrder {
                received: "sdpAnswer",
                state: self.state,
            });
        }
        Ok(())
    }

    pub fn finish_remote_answer(&mut self) -> NegotiationStep {
        self.state = NegotiationState::Stable;
        self.resume()
    }

    /// The exchange in flight failed. Queued requests wait for the next trigger.
    pub fn fail(&mut self) {
        self.state = NegotiationState::Stable;
    }

    /// Ссылка закрывается; true, если запрос на пересогласование так и не был обслужен.
    pub fn abandon(&mut self) -> bool {
        let pending = self.state == NegotiationState::RenegotiationPending || self.queued;
        self.state = NegotiationState::Stable;
        self.queued = false;
        pending
    }

    fn resume(&mut self) -> NegotiationStep {
        if std::mem::take(&mut self.queued) {
            return self.request();
        }
        NegotiationStep::Idle
    }
}

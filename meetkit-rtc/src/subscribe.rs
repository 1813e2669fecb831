//! Subscribe/acknowledge exchange with the signaling backend

use crate::context::{SessionContext, StatusHandler};
use crate::encoding::{EncodingParameter, EncodingParameterSet, VideoCaptureAndEncodeParameter};
use crate::layer::LayerId;
use crate::sdp::repair_subscription_order;
use crate::signaling::{
    SignalFrame, SignalingChannel, SignalingEvent, SignalingObserver, SubscribeAckFrame,
    SubscriptionRequest,
};
use async_trait::async_trait;
use meetkit_core::{
    SessionStatusCode, StreamId, Task, TaskCanceler, TaskError, TaskLifecycle, TaskResult,
    TaskState,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const TASK_NAME: &str = "SubscribeExchangeTask";

type AckSender = oneshot::Sender<TaskResult<SubscribeAckFrame>>;

/// Sends one subscribe request and waits for the backend's acknowledgement
///
/// The wait ends on the acknowledgement, on termination of the signaling
/// connection, or on [`Task::cancel`]. The registration on the signaling
/// channel is removed on every one of these paths.
pub struct SubscribeExchangeTask {
    lifecycle: TaskLifecycle,
}

impl SubscribeExchangeTask {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lifecycle: TaskLifecycle::new(TASK_NAME),
        }
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.lifecycle.state()
    }

    async fn exchange(&self, context: &mut SessionContext) -> TaskResult<()> {
        self.lifecycle.check_canceled()?;

        let (request, subscriptions) =
            Self::prepare_request(context).inspect_err(|e| Self::report(context, e))?;

        // Registered before sending so an immediate acknowledgement is not missed
        let (interceptor, ack) = AckInterceptor::register(
            context.signaling.clone(),
            context.status_handler.clone(),
        );

        info!(
            task = TASK_NAME,
            subscriptions = ?request.video_subscription_indices,
            sending_video = request.is_sending_video,
            "Sending subscribe request"
        );
        if let Err(e) = context.signaling.send(&request) {
            interceptor.revoke();
            let error = TaskError::failed(TASK_NAME, format!("failed to send subscribe request: {e}"));
            Self::report(context, &error);
            return Err(error);
        }

        self.lifecycle.register_canceler(interceptor.clone());
        let result = ack.await.unwrap_or_else(|_| {
            Err(TaskError::failed(TASK_NAME, "acknowledgement wait was abandoned"))
        });
        interceptor.revoke();
        let ack = result?;

        info!(
            task = TASK_NAME,
            tracks = ack.tracks.len(),
            has_answer = ack.sdp_answer.is_some(),
            "Received subscribe acknowledgement"
        );
        context.sdp_answer = ack.sdp_answer.clone();
        context.video_subscriptions = subscriptions;
        context.stream_index.integrate_ack_frame(&ack);
        Ok(())
    }

    /// Everything before the send; nothing reaches the stream index unless
    /// the local description could be read
    fn prepare_request(
        context: &SessionContext,
    ) -> TaskResult<(SubscriptionRequest, Vec<StreamId>)> {
        let local_sdp = context
            .local_sdp
            .as_deref()
            .ok_or_else(|| TaskError::failed(TASK_NAME, "no local description to subscribe with"))?;
        let local_sdp = if context.negotiation.requires_unified_plan_munging {
            context.sdp_editor.to_unified_format(local_sdp)
        } else {
            local_sdp.to_string()
        };

        let subscriptions = if context.negotiation.requires_unified_plan {
            Self::repaired_subscriptions(context, &local_sdp)?
        } else {
            context.video_subscriptions.clone()
        };

        let params = Self::uplink_encodings(context);
        context.stream_index.integrate_uplink_decision(&params);
        context.stream_index.subscribe_frame_sent();

        let request = SubscriptionRequest {
            attendee_id: context.attendee_id.clone(),
            local_sdp,
            signaling_endpoint: context.signaling_endpoint.clone(),
            is_local_audio_muted: context.is_local_audio_muted,
            video_subscription_indices: subscriptions.clone(),
            is_sending_video: context.duplex.is_sending(),
            duplex: context.duplex,
            local_stream_descriptors: context.stream_index.local_stream_descriptors(),
            check_in_mode: context.check_in_mode,
        };
        Ok((request, subscriptions))
    }

    fn report(context: &SessionContext, error: &TaskError) {
        warn!(task = TASK_NAME, %error, "Subscribe exchange failed before the acknowledgement wait");
        context.status_handler.handle_status(error.status(), error);
    }

    fn uplink_encodings(context: &SessionContext) -> EncodingParameterSet {
        match &context.uplink_policy {
            Some(policy) if context.simulcast_enabled() => policy.lock().choose_encoding_parameters(),
            _ => single_layer_encoding(context.video_capture_and_encode_parameter.unwrap_or_default()),
        }
    }

    fn repaired_subscriptions(
        context: &SessionContext,
        local_sdp: &str,
    ) -> TaskResult<Vec<StreamId>> {
        let directions = context
            .sdp_editor
            .video_section_directions(local_sdp)
            .map_err(|e| TaskError::failed(TASK_NAME, e.to_string()))?;

        let repair = repair_subscription_order(&directions, &context.video_subscriptions);
        if repair.unfilled_sections > 0 {
            warn!(
                task = TASK_NAME,
                unfilled = repair.unfilled_sections,
                sections = directions.len(),
                "Fewer subscriptions than receiving video sections"
            );
        }
        if repair.unused_subscriptions > 0 {
            warn!(
                task = TASK_NAME,
                unused = repair.unused_subscriptions,
                sections = directions.len(),
                "More subscriptions than receiving video sections"
            );
        }
        Ok(repair.subscriptions)
    }
}

impl Default for SubscribeExchangeTask {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Task<SessionContext> for SubscribeExchangeTask {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn run(&self, context: &mut SessionContext) -> TaskResult<()> {
        let guard = self.lifecycle.begin()?;
        let result = self.exchange(context).await;
        guard.finish(result)
    }

    fn cancel(&self) {
        self.lifecycle.cancel();
    }
}

/// The single encoding sent when simulcast is off
#[must_use]
pub fn single_layer_encoding(capture: VideoCaptureAndEncodeParameter) -> EncodingParameterSet {
    EncodingParameterSet::single(EncodingParameter {
        layer_id: LayerId::High,
        active: true,
        scale_down_factor: 1.0,
        max_bitrate_bps: u64::from(capture.max_encode_bitrate_kbps) * 1000,
        max_framerate: Some(capture.frame_rate),
    })
}

/// Pending acknowledgement of one exchange
///
/// Observes the signaling channel and doubles as the task's canceler. The
/// result slot is taken at most once and the registration is removed at
/// most once, whichever path gets there first.
struct AckInterceptor {
    this: Weak<AckInterceptor>,
    pending: Mutex<Option<AckSender>>,
    removed: AtomicBool,
    signaling: Arc<dyn SignalingChannel>,
    status_handler: Arc<dyn StatusHandler>,
}

impl AckInterceptor {
    fn register(
        signaling: Arc<dyn SignalingChannel>,
        status_handler: Arc<dyn StatusHandler>,
    ) -> (Arc<Self>, oneshot::Receiver<TaskResult<SubscribeAckFrame>>) {
        let (tx, rx) = oneshot::channel();
        let interceptor = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            pending: Mutex::new(Some(tx)),
            removed: AtomicBool::new(false),
            signaling,
            status_handler,
        });
        interceptor.signaling.register_observer(interceptor.clone());
        (interceptor, rx)
    }

    fn take_pending(&self) -> Option<AckSender> {
        self.pending.lock().take()
    }

    /// Remove the channel registration; only the first call has an effect
    fn revoke(&self) {
        if self.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            let observer: Arc<dyn SignalingObserver> = this;
            self.signaling.remove_observer(&observer);
        }
    }

    fn on_terminated(&self, close_code: u16, reason: &str) {
        let Some(pending) = self.take_pending() else {
            return;
        };

        let status = SessionStatusCode::from_close_code(close_code);
        let error = TaskError::ChannelTerminated {
            task: TASK_NAME.to_string(),
            status,
            close_code,
            reason: reason.to_string(),
        };
        warn!(task = TASK_NAME, close_code, %status, reason, "Signaling terminated while awaiting acknowledgement");

        self.status_handler.handle_status(status, &error);
        let _ = pending.send(Err(error));
        self.revoke();
    }
}

impl SignalingObserver for AckInterceptor {
    fn handle_signaling_event(&self, event: &SignalingEvent) {
        match event {
            SignalingEvent::FrameReceived(frame) => match frame {
                SignalFrame::SubscribeAck(ack) => {
                    if let Some(pending) = self.take_pending() {
                        let _ = pending.send(Ok(ack.clone()));
                    }
                    self.revoke();
                }
                SignalFrame::JoinAck
                | SignalFrame::Index { .. }
                | SignalFrame::Pong { .. }
                | SignalFrame::AudioStatus { .. }
                | SignalFrame::Bitrates
                | SignalFrame::Error { .. } => {}
            },
            SignalingEvent::ConnectionTerminated { close_code, reason } => {
                self.on_terminated(*close_code, reason);
            }
            SignalingEvent::Opened | SignalingEvent::Closed => {}
        }
    }
}

impl TaskCanceler for AckInterceptor {
    fn cancel(&self) {
        if let Some(pending) = self.take_pending() {
            debug!(task = TASK_NAME, "Abandoning acknowledgement wait");
            let _ = pending.send(Err(TaskError::canceled(TASK_NAME)));
        }
        self.revoke();
    }
}

//! Re-applying stored highlights to a freshly rendered lesson.
//!
//! Anchors resolve against the document's baseline tree: first by structural
//! path, then by searching for the text snapshot. The resulting character
//! range is mapped onto the live tree and wrapped in a marker.
//!
//! [`RestorationScheduler`] decides *when* that happens. It never sleeps or
//! spawns anything; the host calls [`RestorationScheduler::tick`] from its
//! event loop and the scheduler acts on whatever deadlines have passed.

use std::ops::Range;
use std::time::{Duration, Instant};

use crate::anchoring::{self, TextSpan};
use crate::document::Document;
use crate::dom::{DocTree, NodeId};
use crate::highlight::{self, ApplyOutcome};
use crate::models::{Anchor, AnchorSlot, Note, NoteId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSettings {
    /// Wait between mounting a document and the restoration pass
    pub settle_delay: Duration,
    /// Offsets from a focus request at which the marker is looked for
    pub focus_retry_delays: Vec<Duration>,
    /// How long a focused marker keeps its flash ring
    pub flash_duration: Duration,
    /// Treat a path that resolves to different text as unresolved
    pub strict_source_match: bool,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            focus_retry_delays: vec![
                Duration::ZERO,
                Duration::from_millis(120),
                Duration::from_millis(400),
            ],
            flash_duration: Duration::from_millis(2000),
            strict_source_match: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The structural path still resolves
    Exact,
    /// Found by searching for the text snapshot
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAnchor {
    /// Characters of the lesson text the anchor covers
    pub range: Range<usize>,
    pub via: Resolution,
}

/// Where a stored anchor lands in `baseline`, if anywhere
pub fn resolve_anchor(baseline: &DocTree, anchor: &Anchor, strict: bool) -> Option<ResolvedAnchor> {
    if let Some(span) = anchoring::decode(baseline, &anchor.shape()) {
        let matches_snapshot = !strict
            || anchor.source_text.is_empty()
            || span.text(baseline).as_deref() == Some(anchor.source_text.as_str());
        if matches_snapshot {
            return Some(ResolvedAnchor {
                range: span.text_range(baseline)?,
                via: Resolution::Exact,
            });
        }
        log::debug!(
            "Anchor {} no longer covers {:?}",
            anchor.start_path,
            anchor.source_text
        );
    }

    let span = anchoring::locate(baseline, baseline.root(), &anchor.source_text)?;
    Some(ResolvedAnchor {
        range: span.text_range(baseline)?,
        via: Resolution::Fallback,
    })
}

/// Tally of one restoration pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub applied: usize,
    pub already_present: usize,
    /// Anchors placed by text search (also counted as applied or present)
    pub via_fallback: usize,
    /// Anchors that could not be placed this pass
    pub orphaned: Vec<(NoteId, AnchorSlot)>,
}

impl RestoreReport {
    fn record(&mut self, note_id: &NoteId, slot: AnchorSlot, outcome: Option<(ApplyOutcome, Resolution)>) {
        match outcome {
            Some((outcome, via)) => {
                match outcome {
                    ApplyOutcome::Applied(_) => self.applied += 1,
                    ApplyOutcome::AlreadyApplied(_) => self.already_present += 1,
                }
                if via == Resolution::Fallback {
                    self.via_fallback += 1;
                }
            }
            None => self.orphaned.push((note_id.clone(), slot)),
        }
    }
}

/// Apply every anchor of one note, primary first
pub fn restore_note(document: &mut Document, note: &Note, strict: bool, report: &mut RestoreReport) {
    for (slot, anchor) in note.anchors() {
        let outcome = restore_anchor(document, &note.id, slot, anchor, strict);
        if outcome.is_none() {
            log::warn!("Orphaned {slot} anchor of note {} for this pass", note.id);
        }
        report.record(&note.id, slot, outcome);
    }
}

/// One pass over every note. Unresolvable anchors are left out; the notes
/// themselves are untouched.
pub fn restore_all(document: &mut Document, notes: &[Note], strict: bool) -> RestoreReport {
    let mut report = RestoreReport::default();
    for note in notes {
        restore_note(document, note, strict, &mut report);
    }
    log::info!(
        "Restored highlights: {} applied, {} already present, {} via fallback, {} orphaned",
        report.applied,
        report.already_present,
        report.via_fallback,
        report.orphaned.len()
    );
    report
}

fn restore_anchor(
    document: &mut Document,
    note_id: &NoteId,
    slot: AnchorSlot,
    anchor: &Anchor,
    strict: bool,
) -> Option<(ApplyOutcome, Resolution)> {
    let resolved = resolve_anchor(document.baseline(), anchor, strict)?;
    let mut span: TextSpan = document.live_span(resolved.range)?;
    match highlight::apply(document.live_mut(), &mut span, note_id, anchor.color, slot) {
        Ok(outcome) => Some((outcome, resolved.via)),
        Err(error) => {
            log::debug!("Could not apply {slot} anchor of note {note_id}: {error}");
            None
        }
    }
}

#[derive(Debug, Clone)]
struct FocusRequest {
    note_id: NoteId,
    requested_at: Instant,
    attempt: usize,
}

/// What a call to [`RestorationScheduler::tick`] did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Set when the restoration pass ran
    pub pass: Option<RestoreReport>,
    /// Note and marker scrolled to and flashed
    pub focused: Option<(NoteId, NodeId)>,
    /// Focus request given up after the last retry
    pub abandoned: Option<NoteId>,
    /// Notes whose flash ring was removed
    pub unflashed: Vec<NoteId>,
}

/// Clock-driven timing of the restoration pass, focus retries and flashes
/// for one mounted document.
#[derive(Debug, Clone)]
pub struct RestorationScheduler {
    settings: RestoreSettings,
    mounted: bool,
    pass_due: Option<Instant>,
    focus: Option<FocusRequest>,
    flashes: Vec<(NoteId, Instant)>,
}

impl RestorationScheduler {
    pub fn new(settings: RestoreSettings) -> Self {
        Self {
            settings,
            mounted: false,
            pass_due: None,
            focus: None,
            flashes: Vec::new(),
        }
    }

    pub fn settings(&self) -> &RestoreSettings {
        &self.settings
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// A document finished rendering; schedule one restoration pass.
    ///
    /// A pending focus request carries over and its remaining retries run
    /// against the new document.
    pub fn mount(&mut self, now: Instant) {
        self.mounted = true;
        self.pass_due = Some(now + self.settings.settle_delay);
        self.flashes.clear();
    }

    /// Cancel everything pending; later ticks do nothing
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.pass_due = None;
        self.focus = None;
        self.flashes.clear();
    }

    /// Scroll to and flash a note's marker, replacing any earlier request
    pub fn request_focus(&mut self, note_id: NoteId, now: Instant) {
        if !self.mounted {
            log::debug!("Ignoring focus request for {note_id}: nothing mounted");
            return;
        }
        self.focus = Some(FocusRequest {
            note_id,
            requested_at: now,
            attempt: 0,
        });
    }

    pub fn pass_pending(&self) -> bool {
        self.pass_due.is_some()
    }

    /// Earliest moment something is due
    pub fn next_deadline(&self) -> Option<Instant> {
        let focus_due = self.focus.as_ref().and_then(|focus| self.focus_due(focus));
        self.pass_due
            .into_iter()
            .chain(focus_due)
            .chain(self.flashes.iter().map(|(_, until)| *until))
            .min()
    }

    /// Run whatever is due at `now`
    pub fn tick(&mut self, now: Instant, document: &mut Document, notes: &[Note]) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if !self.mounted {
            return outcome;
        }

        if self.pass_due.is_some_and(|due| due <= now) {
            self.pass_due = None;
            outcome.pass = Some(restore_all(
                document,
                notes,
                self.settings.strict_source_match,
            ));
        }

        if let Some(focus) = self.focus.take() {
            match self.focus_due(&focus) {
                Some(due) if due <= now => self.attempt_focus(focus, now, document, notes, &mut outcome),
                _ => self.focus = Some(focus),
            }
        }

        let (expired, active): (Vec<_>, Vec<_>) = std::mem::take(&mut self.flashes)
            .into_iter()
            .partition(|(_, until)| *until <= now);
        self.flashes = active;
        for (note_id, _) in expired {
            highlight::unflash(document.live_mut(), &note_id);
            outcome.unflashed.push(note_id);
        }

        outcome
    }

    fn focus_due(&self, focus: &FocusRequest) -> Option<Instant> {
        self.settings
            .focus_retry_delays
            .get(focus.attempt)
            .map(|delay| focus.requested_at + *delay)
    }

    fn attempt_focus(
        &mut self,
        mut focus: FocusRequest,
        now: Instant,
        document: &mut Document,
        notes: &[Note],
        outcome: &mut TickOutcome,
    ) {
        if highlight::markers_for(document.live(), &focus.note_id).is_empty()
            && let Some(note) = notes.iter().find(|note| note.id == focus.note_id)
        {
            let mut report = RestoreReport::default();
            restore_note(document, note, self.settings.strict_source_match, &mut report);
        }

        if let Some(marker) = highlight::flash(document.live_mut(), &focus.note_id) {
            self.flashes.retain(|(note_id, _)| note_id != &focus.note_id);
            self.flashes
                .push((focus.note_id.clone(), now + self.settings.flash_duration));
            outcome.focused = Some((focus.note_id, marker));
            return;
        }

        focus.attempt += 1;
        if self.focus_due(&focus).is_some() {
            self.focus = Some(focus);
        } else {
            log::warn!(
                "No marker for note {} after {} attempts",
                focus.note_id,
                focus.attempt
            );
            outcome.abandoned = Some(focus.note_id);
        }
    }
}

impl Default for RestorationScheduler {
    fn default() -> Self {
        Self::new(RestoreSettings::default())
    }
}

//! The lesson controller.
//!
//! Every request names an [`Action`]. The action's gates run first, in order, and any
//! of them may answer the request on its own. Otherwise the action body runs and
//! returns an [`Outcome`].

use std::sync::Arc;

use log::{error, info, warn};

use crate::access;
use crate::drafts::DraftStore;
use crate::error::AppResult;
use crate::models::{DepositStatus, FieldError, Instructor, Lesson, LessonState, User};
use crate::notify::{self, LessonNotifier};
use crate::params::LessonParams;
use crate::state::{self, UpdateDecision};
use crate::store::LessonStore;

pub const SIGN_IN_REQUIRED: &str = "You need to sign in or sign up before continuing.";
pub const ALMOST_THERE: &str = "You're almost there! We just need a few more details.";
pub const LESSON_CANCELED: &str = "Your lesson has been canceled.";
pub const NO_INSTRUCTOR_ASSIGNED: &str = "No instructor is assigned to this lesson.";

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Index,
    New,
    Create(LessonParams),
    Complete(i32),
    Edit(i32),
    Update(i32, LessonParams),
    Show(i32),
    Destroy(i32),
    SetInstructor(i32),
    RemoveInstructor(i32),
    ConfirmLessonTime(i32, LessonParams),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Authenticate,
    HoldDraft,
    ReplayDraft,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Index => "index",
            Action::New => "new",
            Action::Create(_) => "create",
            Action::Complete(_) => "complete",
            Action::Edit(_) => "edit",
            Action::Update(..) => "update",
            Action::Show(_) => "show",
            Action::Destroy(_) => "destroy",
            Action::SetInstructor(_) => "set_instructor",
            Action::RemoveInstructor(_) => "remove_instructor",
            Action::ConfirmLessonTime(..) => "confirm_lesson_time",
        }
    }

    fn gates(&self) -> &'static [Gate] {
        match self {
            Action::New => &[Gate::ReplayDraft],
            Action::Create(_) => &[Gate::HoldDraft, Gate::ReplayDraft],
            _ => &[Gate::Authenticate, Gate::ReplayDraft],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Root,
    SignUp,
    Lesson(i32),
    Complete(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flash {
    Notice(String),
    Alert(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Index(Vec<Lesson>),
    New,
    /// `form_state` is the state the details form submits back.
    Complete { form_state: LessonState },
    Edit { form_state: LessonState },
    Show,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Redirect {
        to: Target,
        flash: Option<Flash>,
    },
    Render {
        view: View,
        lesson: Option<Lesson>,
        errors: Vec<FieldError>,
        flash: Option<Flash>,
    },
}

impl Outcome {
    fn redirect(to: Target) -> Self {
        Outcome::Redirect { to, flash: None }
    }

    fn redirect_with(to: Target, flash: Flash) -> Self {
        Outcome::Redirect {
            to,
            flash: Some(flash),
        }
    }

    fn render(view: View, lesson: Lesson) -> Self {
        Outcome::Render {
            view,
            lesson: Some(lesson),
            errors: Vec::new(),
            flash: None,
        }
    }

    fn render_errors(view: View, lesson: Lesson, errors: Vec<FieldError>) -> Self {
        Outcome::Render {
            view,
            lesson: Some(lesson),
            errors,
            flash: None,
        }
    }

    fn with_flash(mut self, new_flash: Flash) -> Self {
        match &mut self {
            Outcome::Redirect { flash, .. } | Outcome::Render { flash, .. } => {
                *flash = Some(new_flash);
            }
        }
        self
    }
}

/// The acting user behind a request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: User,
    pub instructor: Option<Instructor>,
}

pub struct LessonsController {
    store: Arc<dyn LessonStore>,
    notifier: Arc<dyn LessonNotifier>,
    drafts: DraftStore,
    support_contact: String,
}

impl LessonsController {
    pub fn new(
        store: Arc<dyn LessonStore>,
        notifier: Arc<dyn LessonNotifier>,
        drafts: DraftStore,
        support_contact: String,
    ) -> Self {
        LessonsController {
            store,
            notifier,
            drafts,
            support_contact,
        }
    }

    pub async fn identify(&self, session: i64) -> AppResult<Option<Identity>> {
        let Some(user) = self.store.find_user_by_telegram_id(session).await? else {
            return Ok(None);
        };
        let instructor = self.store.instructor_for_user(user.id).await?;
        Ok(Some(Identity { user, instructor }))
    }

    /// Registers the chat and runs the first signed-in request, which replays a held
    /// draft if there is one.
    pub async fn sign_up(&self, session: i64, name: &str) -> AppResult<Outcome> {
        let user = self.store.create_user(session, name).await?;
        info!("registered user {} for chat {session}", user.id);
        self.dispatch(session, Action::Index).await
    }

    pub async fn has_draft(&self, session: i64) -> bool {
        self.drafts.contains(session).await
    }

    pub async fn dispatch(&self, session: i64, action: Action) -> AppResult<Outcome> {
        let identity = self.identify(session).await?;
        info!(
            "chat {session} ({}) -> {}",
            identity
                .as_ref()
                .map_or_else(|| "anonymous".to_string(), |i| format!("user {}", i.user.id)),
            action.name()
        );

        for gate in action.gates() {
            match gate {
                Gate::Authenticate => {
                    if identity.is_none() {
                        return Ok(sign_in_required());
                    }
                }
                Gate::HoldDraft => {
                    if identity.is_none() {
                        if let Action::Create(params) = &action {
                            self.drafts.hold(session, params.clone()).await;
                            info!("holding lesson draft for chat {session} until sign-in");
                        }
                        return Ok(sign_in_required());
                    }
                }
                Gate::ReplayDraft => {
                    if let Some(identity) = &identity {
                        if let Some(params) = self.drafts.take(session).await {
                            info!("replaying lesson draft for user {}", identity.user.id);
                            return self.create(identity, params).await;
                        }
                    }
                }
            }
        }

        match (action, identity) {
            (Action::New, _) => Ok(Outcome::Render {
                view: View::New,
                lesson: None,
                errors: Vec::new(),
                flash: None,
            }),
            (_, None) => Ok(sign_in_required()),
            (Action::Index, Some(_)) => self.index().await,
            (Action::Create(params), Some(identity)) => self.create(&identity, params).await,
            (Action::Complete(id), Some(_)) => self.complete(id).await,
            (Action::Edit(id), Some(_)) => self.edit(id).await,
            (Action::Update(id, params), Some(_)) => self.update(id, params).await,
            (Action::Show(id), Some(identity)) => self.show(&identity, id).await,
            (Action::Destroy(id), Some(_)) => self.destroy(id).await,
            (Action::SetInstructor(id), Some(identity)) => self.set_instructor(&identity, id).await,
            (Action::RemoveInstructor(id), Some(_)) => self.remove_instructor(id).await,
            (Action::ConfirmLessonTime(id, params), Some(_)) => {
                self.confirm_lesson_time(id, params).await
            }
        }
    }

    async fn index(&self) -> AppResult<Outcome> {
        let lessons = self.store.list_lessons().await?;
        Ok(Outcome::Render {
            view: View::Index(lessons),
            lesson: None,
            errors: Vec::new(),
            flash: None,
        })
    }

    async fn create(&self, identity: &Identity, params: LessonParams) -> AppResult<Outcome> {
        let mut lesson = Lesson::new(identity.user.id);
        params.assign_to(&mut lesson);
        lesson.state = state::on_create();
        if let Some((date, slot)) = params.lesson_time() {
            lesson.lesson_time = Some(self.store.find_or_create_lesson_time(date, slot).await?);
        }

        let mut errors = params.errors;
        errors.extend(lesson.validate());
        if !errors.is_empty() {
            return Ok(Outcome::render_errors(View::New, lesson, errors));
        }

        match self.store.insert_lesson(&lesson).await {
            Ok(id) => {
                info!("created lesson {id} for user {}", identity.user.id);
                Ok(Outcome::redirect(Target::Complete(id)))
            }
            Err(e) => {
                error!("failed to create lesson for user {}: {e}", identity.user.id);
                Ok(Outcome::render_errors(View::New, lesson, vec![save_failed()]))
            }
        }
    }

    async fn complete(&self, id: i32) -> AppResult<Outcome> {
        let lesson = self.store.find_lesson(id).await?;
        Ok(Outcome::render(
            View::Complete {
                form_state: LessonState::Booked,
            },
            lesson,
        )
        .with_flash(Flash::Notice(ALMOST_THERE.to_string())))
    }

    async fn edit(&self, id: i32) -> AppResult<Outcome> {
        let lesson = self.store.find_lesson(id).await?;
        let form_state = state::edit_form_state(lesson.instructor_id.is_some());
        Ok(Outcome::render(View::Edit { form_state }, lesson))
    }

    async fn update(&self, id: i32, params: LessonParams) -> AppResult<Outcome> {
        let mut lesson = self.store.find_lesson(id).await?;
        if let Err(e) = state::ensure_open(lesson.state) {
            return Ok(Outcome::redirect_with(Target::Lesson(id), Flash::Alert(e.to_string())));
        }
        let original = lesson.clone();

        params.assign_to(&mut lesson);
        if let Some((date, slot)) = params.lesson_time() {
            lesson.lesson_time = Some(self.store.find_or_create_lesson_time(date, slot).await?);
        }
        lesson.deposit_status = DepositStatus::Confirmed;
        let requested = lesson.state;

        let mut errors = params.errors.clone();
        if params.lesson_time().is_none() && (params.date.is_some() || params.slot.is_some()) {
            errors.push(FieldError::new("lesson_time", "can't be blank"));
        }
        errors.extend(lesson.validate());
        let form = View::Edit {
            form_state: requested,
        };

        match state::decide_update(
            requested,
            params.terms_accepted,
            lesson.deposit_status,
            errors.is_empty(),
        ) {
            UpdateDecision::Accept(next) => {
                lesson.state = next;
                if let Err(errors) = self.save(&lesson).await {
                    lesson.state = original.state;
                    return Ok(Outcome::render_errors(form, lesson, errors));
                }
                info!("updated lesson {id} ({})", lesson.state);
                self.notify_instructor_of_update(&original, &mut lesson).await?;
                Ok(Outcome::redirect_with(
                    Target::Lesson(id),
                    Flash::Notice(self.update_success_notice()),
                ))
            }
            UpdateDecision::Fallback {
                state: fallback,
                deposit_recorded,
            } => {
                lesson.state = fallback;
                if params.terms_accepted != Some(true)
                    && !errors.iter().any(|e| e.field == "terms_accepted")
                {
                    errors.push(FieldError::new("terms_accepted", "must be accepted"));
                }
                if let Err(save_errors) = self.save(&lesson).await {
                    error!("lesson {id} could not be saved as {fallback}: {save_errors:?}");
                    lesson.state = original.state;
                    for save_error in save_errors {
                        if !errors.contains(&save_error) {
                            errors.push(save_error);
                        }
                    }
                }
                let outcome = Outcome::render_errors(form, lesson, errors);
                Ok(if deposit_recorded {
                    outcome.with_flash(Flash::Notice(state::FIX_FIELDS_NOTICE.to_string()))
                } else {
                    outcome
                })
            }
            UpdateDecision::Reject => {
                lesson.state = original.state;
                Ok(Outcome::render_errors(form, lesson, errors))
            }
        }
    }

    async fn show(&self, identity: &Identity, id: i32) -> AppResult<Outcome> {
        let lesson = self.store.find_lesson(id).await?;
        if !access::can_view(Some(&identity.user), identity.instructor.as_ref(), &lesson) {
            warn!("user {} denied access to lesson {id}", identity.user.id);
            return Ok(Outcome::redirect_with(
                Target::Root,
                Flash::Alert(access::ACCESS_DENIED.to_string()),
            ));
        }
        Ok(Outcome::render(View::Show, lesson))
    }

    async fn destroy(&self, id: i32) -> AppResult<Outcome> {
        let mut lesson = self.store.find_lesson(id).await?;
        let canceled = Outcome::redirect_with(Target::Root, Flash::Notice(LESSON_CANCELED.to_string()));
        if lesson.state == LessonState::Canceled {
            return Ok(canceled);
        }
        let previous = lesson.clone();
        lesson.state = state::on_cancel();
        if let Err(errors) = self.save(&lesson).await {
            return Ok(Outcome::render_errors(View::Show, previous, errors));
        }
        info!("canceled lesson {id}");

        let instructor = match lesson.instructor_id {
            Some(instructor_id) => Some(self.store.find_instructor(instructor_id).await?),
            None => None,
        };
        notify::lesson_canceled(self.notifier.as_ref(), &lesson, instructor.as_ref()).await;
        Ok(canceled)
    }

    async fn set_instructor(&self, identity: &Identity, id: i32) -> AppResult<Outcome> {
        let mut lesson = self.store.find_lesson(id).await?;
        let acting = identity.instructor.as_ref().map(|i| i.id);
        let (instructor_id, next) = match state::on_instructor_assigned(lesson.state, acting) {
            Ok(transition) => transition,
            Err(e) => {
                return Ok(Outcome::redirect_with(Target::Lesson(id), Flash::Alert(e.to_string())));
            }
        };

        let previous = lesson.clone();
        lesson.instructor_id = Some(instructor_id);
        lesson.state = next;
        if let Err(errors) = self.save(&lesson).await {
            return Ok(Outcome::render_errors(View::Show, previous, errors));
        }
        info!("instructor {instructor_id} took lesson {id}");
        notify::instructor_assigned(self.notifier.as_ref(), &lesson).await;
        Ok(Outcome::redirect(Target::Lesson(id)))
    }

    async fn remove_instructor(&self, id: i32) -> AppResult<Outcome> {
        let mut lesson = self.store.find_lesson(id).await?;
        if let Err(e) = state::ensure_open(lesson.state) {
            return Ok(Outcome::redirect_with(Target::Lesson(id), Flash::Alert(e.to_string())));
        }
        let Some(instructor_id) = lesson.instructor_id else {
            return Ok(Outcome::redirect_with(
                Target::Lesson(id),
                Flash::Alert(NO_INSTRUCTOR_ASSIGNED.to_string()),
            ));
        };
        let instructor = self.store.find_instructor(instructor_id).await?;

        let previous = lesson.clone();
        if let Err(errors) = self.unassign_instructor(&mut lesson, &instructor).await? {
            return Ok(Outcome::render_errors(View::Show, previous, errors));
        }
        Ok(Outcome::redirect(Target::Lesson(id)))
    }

    async fn confirm_lesson_time(&self, id: i32, params: LessonParams) -> AppResult<Outcome> {
        let mut lesson = self.store.find_lesson(id).await?;
        if let Err(e) = state::ensure_open(lesson.state) {
            return Ok(Outcome::redirect_with(Target::Lesson(id), Flash::Alert(e.to_string())));
        }

        params.assign_to(&mut lesson);
        lesson.state = LessonState::WaitingForPayment;
        let mut errors = params.errors;
        errors.extend(lesson.validate());
        lesson.state = state::on_payment_requested(errors.is_empty());
        if !errors.is_empty() {
            return Ok(Outcome::render_errors(View::Show, lesson, errors));
        }

        if let Err(errors) = self.save(&lesson).await {
            lesson.state = state::on_payment_requested(false);
            return Ok(Outcome::render_errors(View::Show, lesson, errors));
        }
        info!("lesson {id} is waiting for payment");
        notify::payment_requested(self.notifier.as_ref(), &lesson).await;
        Ok(Outcome::redirect(Target::Lesson(id)))
    }

    /// Drops `removed` from the lesson and recomputes its state from the instructors
    /// still available. Notices go out only once the change is stored; on a failed
    /// save the lesson is left as it was.
    async fn unassign_instructor(
        &self,
        lesson: &mut Lesson,
        removed: &Instructor,
    ) -> AppResult<Result<(), Vec<FieldError>>> {
        let remaining: Vec<Instructor> = self
            .store
            .eligible_instructors(lesson)
            .await?
            .into_iter()
            .filter(|i| i.id != removed.id)
            .collect();

        let previous = lesson.clone();
        lesson.instructor_id = None;
        lesson.state = state::after_instructor_removed(!remaining.is_empty());
        if let Err(errors) = self.save(lesson).await {
            *lesson = previous;
            return Ok(Err(errors));
        }
        info!(
            "instructor {} removed from lesson {:?}, now {}",
            removed.id, lesson.id, lesson.state
        );
        notify::instructor_removed(self.notifier.as_ref(), lesson, removed, &remaining).await;
        Ok(Ok(()))
    }

    async fn notify_instructor_of_update(
        &self,
        original: &Lesson,
        lesson: &mut Lesson,
    ) -> AppResult<()> {
        let Some(instructor_id) = lesson.instructor_id else {
            return Ok(());
        };
        let changed = lesson.changed_attributes(original);
        if changed.is_empty() {
            return Ok(());
        }

        let instructor = self.store.find_instructor(instructor_id).await?;
        let still_eligible = self
            .store
            .eligible_instructors(lesson)
            .await?
            .iter()
            .any(|i| i.id == instructor.id);
        if still_eligible {
            notify::lesson_updated(self.notifier.as_ref(), original, lesson, &instructor, &changed).await;
        } else if let Err(errors) = self.unassign_instructor(lesson, &instructor).await? {
            error!(
                "could not unassign ineligible instructor {} from lesson {:?}: {errors:?}",
                instructor.id, lesson.id
            );
        }
        Ok(())
    }

    /// A failed save is reported as a validation failure, never as a fatal error.
    async fn save(&self, lesson: &Lesson) -> Result<(), Vec<FieldError>> {
        let errors = lesson.validate();
        if !errors.is_empty() {
            return Err(errors);
        }
        self.store.update_lesson(lesson).await.map_err(|e| {
            error!("failed to save lesson {:?}: {e}", lesson.id);
            vec![save_failed()]
        })
    }

    fn update_success_notice(&self) -> String {
        format!(
            "Thank you, your lesson request was successful. You will receive a notification \
             when an instructor has been matched to your request. If it has been more than an \
             hour since your request, please contact {}.",
            self.support_contact
        )
    }
}

fn sign_in_required() -> Outcome {
    Outcome::redirect_with(Target::SignUp, Flash::Alert(SIGN_IN_REQUIRED.to_string()))
}

fn save_failed() -> FieldError {
    FieldError::new("base", "could not be saved, please try again")
}

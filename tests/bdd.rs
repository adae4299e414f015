use std::fmt;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use cucumber::{given, then, when, World as _};
use tempfile::TempDir;
use url::Url;
use wanderlog::{
    db::{init_pool, DbPool},
    error::AppError,
    models::{
        invitation::InvitationStatus,
        itinerary::{Activity, ActivityForm},
        trip::{NoteForm, NoteUpdate, Trip, TripForm, TripRef, TripUpdate},
        user::UserProfileUpdate,
    },
    services::{
        local_store::LocalTripStore, remote_store::RemoteTripStore, trips::TripService,
        watch::TripWatch,
    },
};

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    trip_id: Option<String>,
    owner: Option<String>,
    invitation_id: Option<String>,
    note_id: Option<String>,
    watch: Option<TripWatch>,
    last_error: Option<AppError>,
}

impl AppWorld {
    fn trips(&self) -> &TripService {
        &self
            .state
            .as_ref()
            .expect("state must be initialised first")
            .trips
    }

    fn db(&self) -> &DbPool {
        &self
            .state
            .as_ref()
            .expect("state must be initialised first")
            .db
    }

    fn trip_ref(&self) -> TripRef {
        TripRef::parse(self.trip_id.as_deref().expect("a trip must exist"))
    }

    fn actor(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    async fn current_trip(&self) -> Trip {
        self.trips()
            .get_trip(&self.trip_ref())
            .await
            .expect("current trip should load")
    }

    async fn activity_by_title(&self, date: NaiveDate, title: &str) -> Activity {
        let trip = self.current_trip().await;
        trip.days
            .get(&date)
            .and_then(|day| day.activities.iter().find(|a| a.title == title))
            .cloned()
            .unwrap_or_else(|| panic!("activity {title} should exist on {date}"))
    }
}

struct TestState {
    trips: TripService,
    db: DbPool,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let guest_root = root.path().join("guest");
        std::fs::create_dir_all(&guest_root)?;

        let db_path = root.path().join("bdd.sqlite");
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let db = init_pool(&database_url, 4).await?;
        sqlx::migrate!("./migrations").run(&db).await?;

        let local = LocalTripStore::new(guest_root);
        local.ensure_structure().await?;
        let remote = RemoteTripStore::new(db.clone());
        let origin: Url = "http://localhost:3000".parse()?;
        let trips = TripService::new(local, remote, origin);

        Ok(Self {
            trips,
            db,
            _root: root,
        })
    }
}

fn date(value: &str) -> NaiveDate {
    value.parse().expect("calendar date")
}

// ---- setup ----

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.trip_id = None;
    world.owner = None;
    world.invitation_id = None;
    world.note_id = None;
    world.watch = None;
    world.last_error = None;
}

async fn create_guest_trip(world: &mut AppWorld, title: String, start: String, end: String) {
    let result = world
        .trips()
        .create_guest_trip(TripForm {
            title,
            start_date: date(&start),
            end_date: date(&end),
        })
        .await;
    match result {
        Ok(trip) => world.trip_id = Some(trip.id),
        Err(err) => world.last_error = Some(err),
    }
}

#[given(regex = r#"^a guest trip "([^"]+)" from "([^"]+)" to "([^"]+)"$"#)]
async fn given_guest_trip(world: &mut AppWorld, title: String, start: String, end: String) {
    create_guest_trip(world, title, start, end).await;
    assert!(world.last_error.is_none(), "guest trip creation failed");
}

#[when(regex = r#"^I create a guest trip "([^"]+)" from "([^"]+)" to "([^"]+)"$"#)]
#[when(regex = r#"^I try to create a guest trip "([^"]+)" from "([^"]+)" to "([^"]+)"$"#)]
async fn when_create_guest_trip(world: &mut AppWorld, title: String, start: String, end: String) {
    create_guest_trip(world, title, start, end).await;
}

#[given(regex = r#"^a remote trip "([^"]+)" owned by "([^"]+)" from "([^"]+)" to "([^"]+)"$"#)]
async fn given_remote_trip(
    world: &mut AppWorld,
    title: String,
    owner: String,
    start: String,
    end: String,
) {
    let trip = world
        .trips()
        .create_trip(
            &owner,
            TripForm {
                title,
                start_date: date(&start),
                end_date: date(&end),
            },
        )
        .await
        .expect("remote trip creation");
    world.trip_id = Some(trip.id);
    world.owner = Some(owner);
}

// ---- activities ----

async fn add_titled_activity(world: &mut AppWorld, title: String, day: &str) {
    let trip = world.trip_ref();
    world
        .trips()
        .add_activity(
            &trip,
            date(day),
            world.actor(),
            ActivityForm {
                title,
                ..ActivityForm::default()
            },
        )
        .await
        .expect("add activity");
}

#[given(regex = r#"^an activity "([^"]+)" on "([^"]+)"$"#)]
#[when(regex = r#"^I add an activity "([^"]+)" on "([^"]+)"$"#)]
async fn add_plain_activity(world: &mut AppWorld, title: String, day: String) {
    add_titled_activity(world, title, &day).await;
}

#[when(regex = r#"^I add an all-day activity "([^"]+)" on "([^"]+)"$"#)]
async fn add_all_day_activity(world: &mut AppWorld, title: String, day: String) {
    let trip = world.trip_ref();
    world
        .trips()
        .add_activity(
            &trip,
            date(&day),
            world.actor(),
            ActivityForm {
                title,
                all_day: Some(true),
                ..ActivityForm::default()
            },
        )
        .await
        .expect("add all-day activity");
}

#[when(regex = r#"^I add an activity "([^"]+)" at "([^"]+)" on "([^"]+)"$"#)]
async fn add_timed_activity(world: &mut AppWorld, title: String, time: String, day: String) {
    let trip = world.trip_ref();
    world
        .trips()
        .add_activity(
            &trip,
            date(&day),
            world.actor(),
            ActivityForm {
                title,
                time: Some(time),
                ..ActivityForm::default()
            },
        )
        .await
        .expect("add timed activity");
}

#[when(regex = r#"^I add activities "([^"]+)" on "([^"]+)"$"#)]
async fn add_many_activities(world: &mut AppWorld, titles: String, day: String) {
    for title in titles.split(',') {
        add_titled_activity(world, title.trim().to_string(), &day).await;
    }
}

#[when(regex = r#"^I delete the activity "([^"]+)" on "([^"]+)"$"#)]
async fn delete_activity(world: &mut AppWorld, title: String, day: String) {
    let day = date(&day);
    let activity = world.activity_by_title(day, &title).await;
    let trip = world.trip_ref();
    world
        .trips()
        .delete_activity(&trip, day, &activity.id)
        .await
        .expect("delete activity");
}

#[when(regex = r#"^I reorder the activities on "([^"]+)" to "([^"]+)"$"#)]
async fn reorder_activities(world: &mut AppWorld, day: String, titles: String) {
    let day = date(&day);
    let mut order = Vec::new();
    for title in titles.split(',') {
        order.push(world.activity_by_title(day, title.trim()).await.id);
    }
    let trip = world.trip_ref();
    world
        .trips()
        .reorder_activities(&trip, day, order)
        .await
        .expect("reorder activities");
}

#[then(regex = r#"^the activities on "([^"]+)" are ordered "([^"]+)"$"#)]
async fn then_activity_order(world: &mut AppWorld, day: String, titles: String) {
    let trip = world.current_trip().await;
    let stored: Vec<String> = trip
        .days
        .get(&date(&day))
        .map(|d| d.activities.iter().map(|a| a.title.clone()).collect())
        .unwrap_or_default();
    let expected: Vec<String> = titles.split(',').map(|t| t.trim().to_string()).collect();
    assert_eq!(stored, expected);
}

#[then(regex = r#"^the activity "([^"]+)" on "([^"]+)" is all-day with no time$"#)]
async fn then_all_day(world: &mut AppWorld, title: String, day: String) {
    let activity = world.activity_by_title(date(&day), &title).await;
    assert_eq!(activity.all_day, Some(true));
    assert_eq!(activity.time, None);
}

#[then(regex = r#"^the activity "([^"]+)" on "([^"]+)" has time "([^"]+)" and no description$"#)]
async fn then_timed(world: &mut AppWorld, title: String, day: String, time: String) {
    let activity = world.activity_by_title(date(&day), &title).await;
    assert_eq!(activity.time.as_deref(), Some(time.as_str()));
    assert_eq!(activity.description, None);
    assert_eq!(activity.lat, None);
    assert_eq!(activity.lng, None);
}

// ---- trips ----

#[then(regex = r#"^the trip has days "([^"]+)"$"#)]
async fn then_trip_days(world: &mut AppWorld, days: String) {
    let trip = world.current_trip().await;
    let stored: Vec<String> = trip.days.keys().map(|d| d.to_string()).collect();
    let expected: Vec<String> = days.split(',').map(|d| d.trim().to_string()).collect();
    assert_eq!(stored, expected);
}

#[then("every day of the trip has no activities")]
async fn then_days_empty(world: &mut AppWorld) {
    let trip = world.current_trip().await;
    assert!(trip.days.values().all(|day| day.activities.is_empty()));
}

#[then(regex = r"^there is exactly (\d+) guest trip stored$")]
async fn then_guest_trip_count(world: &mut AppWorld, expected: usize) {
    let trips = world.trips().list_guest_trips().await.expect("list guest trips");
    assert_eq!(trips.len(), expected);
}

#[then("the guest collection reports stored trips")]
async fn then_guest_collection_not_empty(world: &mut AppWorld) {
    assert!(world.trips().has_guest_trips().await.expect("guest trip check"));
}

#[when(regex = r#"^I rename the trip to "([^"]+)"$"#)]
async fn when_rename_trip(world: &mut AppWorld, title: String) {
    let trip = world.trip_ref();
    world
        .trips()
        .update_trip(
            &trip,
            TripUpdate {
                title: Some(title),
                ..TripUpdate::default()
            },
        )
        .await
        .expect("rename trip");
}

#[when(regex = r#"^I try to move the trip end date to "([^"]+)"$"#)]
async fn when_move_end_date(world: &mut AppWorld, end: String) {
    let trip = world.trip_ref();
    let result = world
        .trips()
        .update_trip(
            &trip,
            TripUpdate {
                end_date: Some(date(&end)),
                ..TripUpdate::default()
            },
        )
        .await;
    world.last_error = result.err();
}

#[then(regex = r#"^the trip is titled "([^"]+)"$"#)]
async fn then_trip_title(world: &mut AppWorld, title: String) {
    assert_eq!(world.current_trip().await.title, title);
}

#[when(regex = r#"^I label "([^"]+)" as "([^"]+)"$"#)]
async fn when_label_day(world: &mut AppWorld, day: String, city: String) {
    let trip = world.trip_ref();
    world
        .trips()
        .update_day_city(&trip, date(&day), Some(city))
        .await
        .expect("label day");
}

#[then(regex = r#"^the day "([^"]+)" is labelled "([^"]+)"$"#)]
async fn then_day_labelled(world: &mut AppWorld, day: String, city: String) {
    let trip = world.current_trip().await;
    let stored = trip.days.get(&date(&day)).and_then(|d| d.city.clone());
    assert_eq!(stored.as_deref(), Some(city.as_str()));
}

// ---- notes ----

#[when(regex = r#"^I add a note "([^"]+)" linking to "([^"]+)"$"#)]
#[when(regex = r#"^I try to add a note "([^"]+)" linking to "([^"]+)"$"#)]
async fn when_add_note(world: &mut AppWorld, title: String, link: String) {
    let trip = world.trip_ref();
    let result = world.trips().add_note(&trip, NoteForm { title, link }).await;
    match result {
        Ok(note) => world.note_id = Some(note.id),
        Err(err) => world.last_error = Some(err),
    }
}

#[when(regex = r#"^I retitle the note to "([^"]+)"$"#)]
async fn when_retitle_note(world: &mut AppWorld, title: String) {
    let trip = world.trip_ref();
    let note_id = world.note_id.clone().expect("a note must exist");
    world
        .trips()
        .update_note(
            &trip,
            &note_id,
            NoteUpdate {
                title: Some(title),
                ..NoteUpdate::default()
            },
        )
        .await
        .expect("retitle note");
}

#[when("I delete the note")]
async fn when_delete_note(world: &mut AppWorld) {
    let trip = world.trip_ref();
    let note_id = world.note_id.clone().expect("a note must exist");
    world
        .trips()
        .delete_note(&trip, &note_id)
        .await
        .expect("delete note");
}

#[then(regex = r#"^the trip has a note "([^"]+)" linking to "([^"]+)"$"#)]
async fn then_trip_has_note(world: &mut AppWorld, title: String, link: String) {
    let trip = world.current_trip().await;
    let notes = trip.notes.unwrap_or_default();
    assert!(
        notes.iter().any(|n| n.title == title && n.link == link),
        "expected note {title} -> {link} in {notes:?}"
    );
}

#[then("the trip has no notes")]
async fn then_trip_has_no_notes(world: &mut AppWorld) {
    let trip = world.current_trip().await;
    assert!(trip.notes.unwrap_or_default().is_empty());
}

#[when("I watch the trip")]
async fn when_watch_trip(world: &mut AppWorld) {
    let trip = world.trip_ref();
    let watch = world.trips().subscribe(&trip);
    world.watch = Some(watch);
}

#[then("the watcher observes a change")]
async fn then_watcher_notified(world: &mut AppWorld) {
    let expected = world.trip_id.clone().expect("a trip must exist");
    let change = world
        .watch
        .as_mut()
        .expect("a watch must be registered")
        .changed()
        .await
        .expect("the change channel should stay open");
    assert_eq!(change.trip_id, expected);
}

// ---- reviews ----

#[given(regex = r#"^a (\d+)-star review for "([^"]+)"$"#)]
async fn given_review(world: &mut AppWorld, rating: u8, day: String) {
    let trip = world.trip_ref();
    world
        .trips()
        .add_day_review(&trip, date(&day), world.actor(), rating, None)
        .await
        .expect("add day review");
}

#[when(regex = r#"^I try to review "([^"]+)" with (\d+) stars$"#)]
async fn when_try_review(world: &mut AppWorld, day: String, rating: u8) {
    let trip = world.trip_ref();
    let result = world
        .trips()
        .add_day_review(&trip, date(&day), world.actor(), rating, None)
        .await;
    world.last_error = result.err();
}

#[then(regex = r#"^the day "([^"]+)" has a (\d+)-star review$"#)]
async fn then_day_reviewed(world: &mut AppWorld, day: String, rating: u8) {
    let trip = world.current_trip().await;
    let review = trip
        .days
        .get(&date(&day))
        .and_then(|d| d.day_review.as_ref())
        .expect("day should have a review");
    assert_eq!(review.rating, rating);
}

#[then(regex = r#"^the day "([^"]+)" has no review$"#)]
async fn then_day_unreviewed(world: &mut AppWorld, day: String) {
    let trip = world.current_trip().await;
    let review = trip.days.get(&date(&day)).and_then(|d| d.day_review.as_ref());
    assert!(review.is_none(), "review should have been invalidated");
}

// ---- invitations ----

#[given(regex = r#"^"([^"]+)" invites "([^"]+)"$"#)]
#[when(regex = r#"^"([^"]+)" invites "([^"]+)"$"#)]
async fn invite(world: &mut AppWorld, inviter: String, email: String) {
    let trip = world.trip_ref();
    let result = world
        .trips()
        .create_invitation(&trip, &inviter, Some(email))
        .await;
    match result {
        Ok(invitation) => world.invitation_id = Some(invitation.id),
        Err(err) => world.last_error = Some(err),
    }
}

#[when(regex = r#"^"([^"]+)" creates a link-only invitation$"#)]
async fn invite_link_only(world: &mut AppWorld, inviter: String) {
    let trip = world.trip_ref();
    let invitation = world
        .trips()
        .create_invitation(&trip, &inviter, None)
        .await
        .expect("link-only invitation");
    world.invitation_id = Some(invitation.id);
}

#[given(regex = r#"^the invitation expired an hour ago$"#)]
async fn given_invitation_expired(world: &mut AppWorld) {
    let id = world.invitation_id.clone().expect("an invitation must exist");
    sqlx::query("UPDATE invitations SET expires_at = ?1 WHERE id = ?2")
        .bind(Utc::now() - Duration::hours(1))
        .bind(&id)
        .execute(world.db())
        .await
        .expect("backdate invitation");
}

#[when(regex = r#"^"([^"]+)" accepts the invitation$"#)]
async fn accept_invitation(world: &mut AppWorld, user: String) {
    let id = world.invitation_id.clone().expect("an invitation must exist");
    let result = world.trips().accept_invitation(&id, &user).await;
    world.last_error = result.err();
}

#[when(regex = r#"^"([^"]+)" declines the invitation$"#)]
async fn decline_invitation(world: &mut AppWorld, _user: String) {
    let id = world.invitation_id.clone().expect("an invitation must exist");
    let result = world.trips().decline_invitation(&id).await;
    world.last_error = result.err();
}

#[then(regex = r#"^"([^"]+)" has (\d+) pending invitations?$"#)]
async fn then_pending_count(world: &mut AppWorld, email: String, expected: usize) {
    let pending = world
        .trips()
        .pending_invitations_for(&email)
        .await
        .expect("pending invitations");
    assert_eq!(pending.len(), expected);
}

#[then(regex = r#"^the trip participants are "([^"]+)"$"#)]
async fn then_participants(world: &mut AppWorld, expected: String) {
    let trip = world.current_trip().await;
    let expected: Vec<String> = expected.split(',').map(|p| p.trim().to_string()).collect();
    assert_eq!(trip.participants, expected);
}

#[then(regex = r#"^the invitation status is "([^"]+)"$"#)]
async fn then_invitation_status(world: &mut AppWorld, status: String) {
    let id = world.invitation_id.clone().expect("an invitation must exist");
    let invitation = world.trips().get_invitation(&id).await.expect("invitation");
    let expected = InvitationStatus::parse(&status).expect("known status");
    assert_eq!(invitation.status, expected);
}

#[then("the invitation has no invited email")]
async fn then_no_invited_email(world: &mut AppWorld) {
    let id = world.invitation_id.clone().expect("an invitation must exist");
    let invitation = world.trips().get_invitation(&id).await.expect("invitation");
    assert_eq!(invitation.invited_email, None);
}

#[then(regex = r#"^the invited emails contain "([^"]+)"$"#)]
async fn then_invited_emails_contain(world: &mut AppWorld, email: String) {
    let trip = world.current_trip().await;
    let emails = trip.invited_emails.unwrap_or_default();
    assert!(emails.contains(&email), "expected {email} in {emails:?}");
}

#[then("the trip has no invited emails")]
async fn then_no_invited_emails(world: &mut AppWorld) {
    let trip = world.current_trip().await;
    assert!(trip.invited_emails.unwrap_or_default().is_empty());
}

// ---- profiles ----

#[when(regex = r#"^"([^"]+)" signs in with email "([^"]+)" named "([^"]+)"$"#)]
async fn when_sign_in(world: &mut AppWorld, uid: String, email: String, name: String) {
    world
        .trips()
        .ensure_user(&uid, &email, &name, None)
        .await
        .expect("ensure user");
}

#[when(regex = r#"^"([^"]+)" renames their profile to "([^"]+)"$"#)]
async fn when_rename_profile(world: &mut AppWorld, uid: String, name: String) {
    world
        .trips()
        .update_user(
            &uid,
            UserProfileUpdate {
                display_name: Some(name),
                ..UserProfileUpdate::default()
            },
        )
        .await
        .expect("update user");
}

#[then(regex = r#"^the profile for "([^"]+)" has email "([^"]+)"$"#)]
async fn then_profile_email(world: &mut AppWorld, uid: String, email: String) {
    let profile = world.trips().get_user(&uid).await.expect("profile");
    assert_eq!(profile.email, email);
}

#[then(regex = r#"^the profile for "([^"]+)" is named "([^"]+)"$"#)]
async fn then_profile_name(world: &mut AppWorld, uid: String, name: String) {
    let profile = world.trips().get_user(&uid).await.expect("profile");
    assert_eq!(profile.display_name, name);
}

// ---- outcomes ----

#[then("the operation fails with a validation error")]
async fn then_validation_error(world: &mut AppWorld) {
    assert!(
        matches!(world.last_error, Some(AppError::Validation(_))),
        "expected validation error, got {:?}",
        world.last_error
    );
}

#[then("the operation fails because the invitation has expired")]
async fn then_expired_error(world: &mut AppWorld) {
    assert!(matches!(world.last_error, Some(AppError::Expired)));
}

#[then("the operation fails because the invitation is already resolved")]
async fn then_already_resolved_error(world: &mut AppWorld) {
    assert!(matches!(world.last_error, Some(AppError::AlreadyResolved)));
}

#[then("the operation is forbidden")]
async fn then_forbidden(world: &mut AppWorld) {
    assert!(matches!(world.last_error, Some(AppError::Forbidden)));
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}

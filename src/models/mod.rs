pub mod invitation;
pub mod itinerary;
pub mod trip;
pub mod user;

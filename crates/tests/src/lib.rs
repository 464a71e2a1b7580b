pub mod fixtures;

#[cfg(test)]
mod auth_tests;
#[cfg(test)]
mod chat_tests;
#[cfg(test)]
mod lifecycle_tests;
#[cfg(test)]
mod room_tests;
#[cfg(test)]
mod seat_tests;

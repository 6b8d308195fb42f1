mod helpers;
mod insights;
mod readings;
mod round_trip;

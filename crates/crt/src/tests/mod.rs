mod helpers;

mod insert_tests;
mod invariant_tests;

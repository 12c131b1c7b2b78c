mod helpers;

mod validate_tests;

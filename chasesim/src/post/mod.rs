pub mod chase_result;

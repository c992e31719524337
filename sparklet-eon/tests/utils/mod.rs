#![allow(dead_code)]

pub mod tester;

#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]

fn main() {
    rockfall_sentinel::run();
}

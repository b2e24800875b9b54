fn main() {
    sonar_survey::cli::run();
}

fn main() -> anyhow::Result<()> {
    studyquest_lib::run()
}

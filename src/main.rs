#[actix_web::main]
async fn main() -> std::io::Result<()> {
    report_generation_server::run().await
}

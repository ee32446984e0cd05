#[rocket::main]
async fn main() -> Result<(), rocket::Error> {
    let _ = cesizen_api::rocket().launch().await?;
    Ok(())
}
